/*
 * ABI encoding helpers and numeric conversions shared across modules
 */

use crate::models::{EngineError, Result};
use ethers::abi::{encode, ParamType, Token};
use ethers::types::{Address, U256};
use ethers::utils::keccak256;
use num_bigint::BigUint;
use num_traits::ToPrimitive;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;

/// First four bytes of the keccak-256 hash of a function signature.
#[must_use]
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Builds calldata for a function call: selector followed by ABI-encoded args.
#[must_use]
pub fn encode_call(signature: &str, tokens: &[Token]) -> Vec<u8> {
    let mut calldata = Vec::from(selector(signature));
    calldata.extend_from_slice(&encode(tokens));
    calldata
}

pub fn abi_decode(types: &[ParamType], data: &[u8]) -> Result<Vec<Token>> {
    ethers::abi::decode(types, data)
        .map_err(|e| EngineError::ContractError(format!("ABI decode error: {e}")))
}

pub fn token_address(token: &Token) -> Result<Address> {
    match token {
        Token::Address(a) => Ok(*a),
        other => Err(EngineError::ContractError(format!(
            "Expected address token, got {other:?}"
        ))),
    }
}

pub fn token_uint(token: &Token) -> Result<U256> {
    match token {
        Token::Uint(v) => Ok(*v),
        other => Err(EngineError::ContractError(format!(
            "Expected uint token, got {other:?}"
        ))),
    }
}

/// Interprets a decoded `int` token as a tick. Decoded ints arrive
/// sign-extended to 256 bits, so the low 64 bits carry the value.
pub fn token_tick(token: &Token) -> Result<i32> {
    match token {
        Token::Int(v) => Ok(v.low_u64() as i64 as i32),
        other => Err(EngineError::ContractError(format!(
            "Expected int token, got {other:?}"
        ))),
    }
}

/// Sign-extends a 24-bit two's-complement field to i32.
#[must_use]
pub fn i32_from_int24_bits(bits: u32) -> i32 {
    let bits = bits & 0x00FF_FFFF;
    if bits & 0x0080_0000 != 0 {
        #[allow(clippy::cast_possible_wrap)]
        let extended = (bits | 0xFF00_0000) as i32;
        extended
    } else {
        #[allow(clippy::cast_possible_wrap)]
        let plain = bits as i32;
        plain
    }
}

/// Big-endian 3-byte two's-complement encoding of an int24 tick.
#[must_use]
pub fn int24_be_bytes(tick: i32) -> [u8; 3] {
    #[allow(clippy::cast_sign_loss)]
    let bits = (tick as u32) & 0x00FF_FFFF;
    let be = bits.to_be_bytes();
    [be[1], be[2], be[3]]
}

/// An `int24` value as an ABI token, sign-extended to 256 bits.
#[must_use]
pub fn int24_token(tick: i32) -> Token {
    let value = if tick >= 0 {
        U256::from(tick as u64)
    } else {
        // Two's complement over the full 256-bit word.
        U256::MAX - U256::from((-(i64::from(tick)) - 1) as u64)
    };
    Token::Int(value)
}

pub fn biguint_to_u256(value: &BigUint) -> Result<U256> {
    let bytes = value.to_bytes_be();
    if bytes.len() > 32 {
        return Err(EngineError::CalculationError(format!(
            "Value exceeds 256 bits: {value}"
        )));
    }
    Ok(U256::from_big_endian(&bytes))
}

#[must_use]
pub fn u256_to_biguint(value: U256) -> BigUint {
    let mut bytes = [0u8; 32];
    value.to_big_endian(&mut bytes);
    BigUint::from_bytes_be(&bytes)
}

/// Parses a decimal-string wei amount.
pub fn parse_wei(raw: &str) -> Result<U256> {
    U256::from_dec_str(raw.trim())
        .map_err(|e| EngineError::InvalidInput(format!("Invalid wei amount {raw}: {e}")))
}

/// Converts a raw integer amount to a human-readable decimal using the
/// token's decimals. Falls back to an f64 approximation for magnitudes
/// beyond `Decimal` range.
#[must_use]
pub fn human_amount(raw: &BigUint, decimals: u8) -> Decimal {
    let digits = raw.to_string();
    let scale = decimals as usize;
    let (int_part, frac_part) = if digits.len() > scale {
        let split = digits.len() - scale;
        (digits[..split].to_string(), digits[split..].to_string())
    } else {
        ("0".to_string(), format!("{digits:0>scale$}"))
    };
    // Decimal carries 28 significant digits; trim the fraction to fit.
    let frac_room = 28usize.saturating_sub(int_part.len()).min(frac_part.len());
    let formatted = if frac_room == 0 {
        int_part.clone()
    } else {
        format!("{int_part}.{}", &frac_part[..frac_room])
    };
    Decimal::from_str(&formatted).unwrap_or_else(|_| {
        let approx = raw.to_f64().unwrap_or(0.0) / 10f64.powi(i32::from(decimals));
        Decimal::from_f64(approx).unwrap_or(Decimal::ZERO)
    })
}

/// Returns the pair in canonical order: lower address first.
#[must_use]
pub fn sort_addresses(a: Address, b: Address) -> (Address, Address) {
    if a.as_bytes() <= b.as_bytes() {
        (a, b)
    } else {
        (b, a)
    }
}
