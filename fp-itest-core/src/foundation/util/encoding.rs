use crate::foundation::{Hash32, ItestError};

pub fn decode_hex(s: &str) -> Result<Vec<u8>, ItestError> {
    hex::decode(s.trim().trim_start_matches("0x")).map_err(|e| e.into())
}

pub fn parse_hex_32bytes(s: &str) -> Result<Hash32, ItestError> {
    let bytes = decode_hex(s)?;
    let len = bytes.len();
    bytes.try_into().map_err(|_| ItestError::InvalidKey(format!("expected 32 bytes, got {len}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_32bytes() {
        let hex = "0x".to_string() + &"ab".repeat(32);
        assert_eq!(parse_hex_32bytes(&hex).expect("parse"), [0xab; 32]);
        assert!(parse_hex_32bytes("abcd").is_err());
        assert!(parse_hex_32bytes("zz").is_err());
    }
}
