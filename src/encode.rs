use std::collections::HashMap;

use crate::BencodeType;

/// Encode [`BencodeType`] to bytes
///
/// Dict keys are always emitted in ascending byte order, so equal values always produce identical
/// output regardless of how the dict was built.
pub fn encode(data: &BencodeType) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_into(&mut buf, data);
    buf
}

/// Encode a dict, emitting keys in ascending byte order
pub fn encode_dict(dict: &HashMap<Vec<u8>, BencodeType>) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_dict_into(&mut buf, dict);
    buf
}

/// Encode a byte string as `<length>:<contents>`
pub fn encode_byte_string(bytes: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(bytes.len() + 8);
    encode_byte_string_into(&mut buf, bytes);
    buf
}

fn encode_into(buf: &mut Vec<u8>, data: &BencodeType) {
    match data {
        BencodeType::Integer(int) => {
            buf.push(b'i');
            buf.extend_from_slice(int.to_string().as_bytes());
            buf.push(b'e');
        }
        BencodeType::ByteString(bytes) => encode_byte_string_into(buf, bytes),
        BencodeType::List(items) => {
            buf.push(b'l');
            for item in items {
                encode_into(buf, item);
            }
            buf.push(b'e');
        }
        BencodeType::Dict(dict) => encode_dict_into(buf, dict),
    }
}

fn encode_byte_string_into(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(bytes.len().to_string().as_bytes());
    buf.push(b':');
    buf.extend_from_slice(bytes);
}

fn encode_dict_into(buf: &mut Vec<u8>, dict: &HashMap<Vec<u8>, BencodeType>) {
    let mut pairs = dict.iter().collect::<Vec<_>>();
    pairs.sort_by(|a, b| a.0.cmp(b.0));
    buf.push(b'd');
    for (key, value) in pairs {
        encode_byte_string_into(buf, key);
        encode_into(buf, value);
    }
    buf.push(b'e');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::decode;

    #[test]
    fn encode_integer() {
        assert_eq!(encode(&BencodeType::Integer(42)), b"i42e");
        assert_eq!(encode(&BencodeType::Integer(-5)), b"i-5e");
        assert_eq!(encode(&BencodeType::Integer(0)), b"i0e");
    }

    #[test]
    fn encode_string_value() {
        let string = "hello";
        let expected_output = format!("{}:{}", string.len(), string);
        assert_eq!(encode(&BencodeType::string(string)), expected_output.as_bytes());
    }

    #[test]
    fn encode_list() {
        let data = BencodeType::List(vec![
            BencodeType::Integer(42),
            BencodeType::string("hello"),
        ]);
        assert_eq!(encode(&data), b"li42e5:helloe");
    }

    #[test]
    fn encode_dict_sorts_keys() {
        let key1 = "creation date";
        let value1 = 1234567890;
        let key2 = "comment";
        let value2 = "Description of contents";
        let mut map = HashMap::new();
        map.insert(key1.as_bytes().to_vec(), BencodeType::Integer(value1));
        map.insert(key2.as_bytes().to_vec(), BencodeType::string(value2));
        let expected_output = format!(
            "d{}:{}{}:{}{}:{}i{}ee",
            key2.len(),
            key2,
            value2.len(),
            value2,
            key1.len(),
            key1,
            value1,
        );
        assert_eq!(encode_dict(&map), expected_output.as_bytes());
    }

    #[test]
    fn encode_dict_orders_keys_bytewise() {
        // Uppercase sorts before lowercase, and a prefix sorts before its extensions
        let mut map = HashMap::new();
        for key in ["b", "B", "ab", "a"] {
            map.insert(key.as_bytes().to_vec(), BencodeType::Integer(1));
        }
        assert_eq!(encode_dict(&map), b"d1:Bi1e1:ai1e2:abi1e1:bi1ee");
    }

    #[test]
    fn encode_nested_dict_sorts_inner_keys() {
        let mut inner = HashMap::new();
        inner.insert(b"z".to_vec(), BencodeType::Integer(1));
        inner.insert(b"a".to_vec(), BencodeType::Integer(2));
        let mut outer = HashMap::new();
        outer.insert(b"files".to_vec(), BencodeType::List(vec![BencodeType::Dict(inner)]));
        assert_eq!(encode_dict(&outer), b"d5:filesld1:ai2e1:zi1eeee");
    }

    #[test]
    fn encoded_byte_string_decodes_to_same_bytes() {
        let cases: [&[u8]; 4] = [b"", b"spam", b"\x00\x01\xff", &[b'x'; 300]];
        for bytes in cases {
            let encoded = encode_byte_string(bytes);
            let (value, consumed) = decode(&encoded).unwrap();
            assert_eq!(value, BencodeType::ByteString(bytes.to_vec()));
            assert_eq!(consumed, bytes.len().to_string().len() + 1 + bytes.len());
        }
    }

    #[test]
    fn decoding_encoded_dict_reproduces_dict() {
        let mut files = HashMap::new();
        files.insert(b"length".to_vec(), BencodeType::Integer(128));
        files.insert(
            b"path".to_vec(),
            BencodeType::List(vec![BencodeType::string("dir"), BencodeType::string("a.txt")]),
        );
        let mut map = HashMap::new();
        map.insert(b"name".to_vec(), BencodeType::string("dir"));
        map.insert(b"piece length".to_vec(), BencodeType::Integer(-16384));
        map.insert(b"files".to_vec(), BencodeType::List(vec![BencodeType::Dict(files)]));
        let data = BencodeType::Dict(map);

        let encoded = encode(&data);
        let (decoded, consumed) = decode(&encoded).unwrap();
        assert_eq!(decoded, data);
        assert_eq!(consumed, encoded.len());
    }
}
