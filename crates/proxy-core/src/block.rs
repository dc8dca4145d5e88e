// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Block parameter parsing shared by routing and caching

use serde_json::Value;

/// Named block tags of the Ethereum JSON-RPC API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockTag {
    /// Chain head
    Latest,
    /// Genesis block
    Earliest,
    /// Pending state
    Pending,
    /// Latest safe head
    Safe,
    /// Latest finalized block
    Finalized,
}

impl BlockTag {
    /// Parse a tag name
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "latest" => Some(Self::Latest),
            "earliest" => Some(Self::Earliest),
            "pending" => Some(Self::Pending),
            "safe" => Some(Self::Safe),
            "finalized" => Some(Self::Finalized),
            _ => None,
        }
    }
}

/// A block parameter that names a tag or a height
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockRef {
    /// Named tag
    Tag(BlockTag),
    /// Explicit block height
    Number(u64),
}

impl BlockRef {
    /// Interpret a JSON-RPC parameter as a block reference
    ///
    /// Only strings qualify. Hex quantities that do not fit in 64 bits,
    /// block-hash objects and any other shape yield `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        let text = value.as_str()?;
        if let Some(tag) = BlockTag::parse(text) {
            return Some(Self::Tag(tag));
        }
        parse_hex_quantity(text).map(Self::Number)
    }
}

/// Parse a `0x`-prefixed hex quantity
pub fn parse_hex_quantity(value: &str) -> Option<u64> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u64::from_str_radix(digits, 16).ok()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn tags() {
        assert_eq!(
            BlockRef::from_value(&json!("latest")),
            Some(BlockRef::Tag(BlockTag::Latest))
        );
        assert_eq!(
            BlockRef::from_value(&json!("finalized")),
            Some(BlockRef::Tag(BlockTag::Finalized))
        );
        assert_eq!(BlockRef::from_value(&json!("Latest")), None);
    }

    #[test]
    fn hex_quantities() {
        assert_eq!(parse_hex_quantity("0x10"), Some(16));
        assert_eq!(parse_hex_quantity("0x0"), Some(0));
        assert_eq!(parse_hex_quantity("0xffffffffffffffff"), Some(u64::MAX));
        assert_eq!(parse_hex_quantity("0x10000000000000000"), None);
        assert_eq!(parse_hex_quantity("0x"), None);
        assert_eq!(parse_hex_quantity("0x+1"), None);
        assert_eq!(parse_hex_quantity("16"), None);
    }

    #[test]
    fn non_string_values() {
        assert_eq!(BlockRef::from_value(&json!({"blockHash": "0xabc"})), None);
        assert_eq!(BlockRef::from_value(&json!(16)), None);
        assert_eq!(BlockRef::from_value(&Value::Null), None);
    }
}
