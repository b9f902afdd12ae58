use std::collections::HashMap;

use nom::{
    bytes::complete::{tag, take, take_until},
    sequence::{delimited, terminated},
    IResult, Parser,
};
use thiserror::Error;

use crate::BencodeType;

/// Maximum nesting of lists/dicts accepted by the decoder
pub const MAX_DEPTH: usize = 64;

const COLON: &[u8] = b":";
const INTEGER_START: &[u8] = b"i";
const END: &[u8] = b"e";
const END_BYTE: u8 = b'e';

/// Errors produced while decoding bencoded data
#[derive(Debug, Error, PartialEq)]
pub enum DecodeError {
    #[error("empty data")]
    EmptyInput,
    #[error("unknown type: {0:?}")]
    UnknownType(char),
    #[error("invalid string format: malformed length prefix")]
    MalformedString,
    #[error("string data too short")]
    TruncatedString,
    #[error("invalid integer format: no end marker")]
    UnterminatedInteger,
    #[error("invalid integer format: leading zeros")]
    LeadingZero,
    #[error("invalid integer format: negative zero")]
    NegativeZero,
    #[error("invalid integer: {0:?}")]
    InvalidDigits(String),
    #[error("invalid list format: no end marker")]
    UnterminatedList,
    #[error("error decoding list item: {0}")]
    ListItem(Box<DecodeError>),
    #[error("dictionary key is not a string")]
    NonStringKey,
    #[error("invalid dictionary format: no end marker")]
    UnterminatedDictionary,
    #[error("error decoding dictionary value: {0}")]
    DictionaryValue(Box<DecodeError>),
    #[error("nesting too deep")]
    NestingTooDeep,
}

/// Decode the single bencoded value at the start of `data`
///
/// Returns the value along with the number of bytes it occupied. Any bytes after the value are
/// left untouched, so callers can use the count to advance through a buffer.
pub fn decode(data: &[u8]) -> Result<(BencodeType, usize), DecodeError> {
    decode_value(data, 0)
}

/// Find the raw bytes of the value stored under `key` in the bencoded dict at the start of
/// `data`
///
/// Returns `Ok(None)` if `data` isn't a dict or the key is absent. With duplicate keys the last
/// occurrence wins, matching [`decode`].
pub fn dict_value_span<'a>(data: &'a [u8], key: &[u8]) -> Result<Option<&'a [u8]>, DecodeError> {
    if data.first() != Some(&b'd') {
        return Ok(None);
    }
    let mut span = None;
    walk_dict(data, 0, |entry_key, _, raw| {
        if entry_key == key {
            span = Some(raw);
        }
    })?;
    Ok(span)
}

fn decode_value(data: &[u8], depth: usize) -> Result<(BencodeType, usize), DecodeError> {
    let type_byte = *data.first().ok_or(DecodeError::EmptyInput)?;
    match type_byte {
        b'0'..=b'9' => {
            let (bytes, consumed) = decode_byte_string(data)?;
            Ok((BencodeType::ByteString(bytes.to_vec()), consumed))
        }
        b'i' => decode_integer(data),
        b'l' => decode_list(data, depth),
        b'd' => {
            let mut dict = HashMap::new();
            let consumed = walk_dict(data, depth, |key, value, _| {
                dict.insert(key.to_vec(), value);
            })?;
            Ok((BencodeType::Dict(dict), consumed))
        }
        other => Err(DecodeError::UnknownType(other as char)),
    }
}

fn length_prefix(input: &[u8]) -> IResult<&[u8], &[u8]> {
    terminated(take_until(COLON), tag(COLON)).parse(input)
}

fn integer_body(input: &[u8]) -> IResult<&[u8], &[u8]> {
    delimited(tag(INTEGER_START), take_until(END), tag(END)).parse(input)
}

fn contents(input: &[u8], len: usize) -> IResult<&[u8], &[u8]> {
    take(len).parse(input)
}

/// Decode `<length>:<contents>`, borrowing the contents from `data`
fn decode_byte_string(data: &[u8]) -> Result<(&[u8], usize), DecodeError> {
    let (rest, len_digits) = length_prefix(data).map_err(|_| DecodeError::MalformedString)?;
    let digits = std::str::from_utf8(len_digits)
        .ok()
        .filter(|digits| !digits.is_empty() && digits.bytes().all(|byte| byte.is_ascii_digit()))
        .ok_or(DecodeError::MalformedString)?;
    // A numeric length too large for `usize` can never fit in the buffer
    let len = digits
        .parse::<usize>()
        .map_err(|_| DecodeError::TruncatedString)?;
    let (rest, bytes) = contents(rest, len).map_err(|_| DecodeError::TruncatedString)?;
    Ok((bytes, data.len() - rest.len()))
}

/// Decode `i<number>e`
fn decode_integer(data: &[u8]) -> Result<(BencodeType, usize), DecodeError> {
    let (rest, body) = integer_body(data).map_err(|_| DecodeError::UnterminatedInteger)?;
    if body.len() > 1 && body[0] == b'0' {
        return Err(DecodeError::LeadingZero);
    }
    if body.len() > 1 && body.starts_with(b"-0") {
        return Err(DecodeError::NegativeZero);
    }

    let digits = body.strip_prefix(b"-").unwrap_or(body);
    let text = String::from_utf8_lossy(body);
    if digits.is_empty() || !digits.iter().all(|byte| byte.is_ascii_digit()) {
        return Err(DecodeError::InvalidDigits(text.into_owned()));
    }
    let integer = text
        .parse::<i64>()
        .map_err(|_| DecodeError::InvalidDigits(text.to_string()))?;
    Ok((BencodeType::Integer(integer), data.len() - rest.len()))
}

/// Decode `l<item>*e`
fn decode_list(data: &[u8], depth: usize) -> Result<(BencodeType, usize), DecodeError> {
    if depth >= MAX_DEPTH {
        return Err(DecodeError::NestingTooDeep);
    }
    let mut items = Vec::new();
    let mut pos = 1;
    loop {
        match data.get(pos) {
            None => return Err(DecodeError::UnterminatedList),
            Some(&END_BYTE) => break,
            Some(_) => {
                let (item, consumed) = decode_value(&data[pos..], depth + 1)
                    .map_err(|e| DecodeError::ListItem(Box::new(e)))?;
                items.push(item);
                pos += consumed;
            }
        }
    }
    Ok((BencodeType::List(items), pos + 1))
}

/// Walk `d(<key><value>)*e`, handing every entry and its raw value bytes to `visit`
///
/// Returns the number of bytes the whole dict occupied.
fn walk_dict<'a, F>(data: &'a [u8], depth: usize, mut visit: F) -> Result<usize, DecodeError>
where
    F: FnMut(&'a [u8], BencodeType, &'a [u8]),
{
    if depth >= MAX_DEPTH {
        return Err(DecodeError::NestingTooDeep);
    }
    let mut pos = 1;
    loop {
        match data.get(pos) {
            None => return Err(DecodeError::UnterminatedDictionary),
            Some(&END_BYTE) => break,
            Some(byte) if !byte.is_ascii_digit() => return Err(DecodeError::NonStringKey),
            Some(_) => {
                let (key, consumed) = decode_byte_string(&data[pos..])?;
                pos += consumed;
                if pos >= data.len() {
                    return Err(DecodeError::UnterminatedDictionary);
                }
                let (value, consumed) = decode_value(&data[pos..], depth + 1)
                    .map_err(|e| DecodeError::DictionaryValue(Box::new(e)))?;
                visit(key, value, &data[pos..pos + consumed]);
                pos += consumed;
            }
        }
    }
    Ok(pos + 1)
}
