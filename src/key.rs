//! The structured key schema (spec.md §3-4.3): a logical
//! `(type, state, ns, field, value, xmin, xmax)` tuple with two on-wire
//! encodings chosen by `state`, so that a single prefix scan recovers either
//! "every version of one logical row" (`com`) or "every write made by one
//! transaction" (`unc`).

use crate::bvalue::Value;
use crate::error::{Error, Result};
use crate::txid::TxId;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyType {
    Rec,
    Ptr,
    Idx,
}

impl KeyType {
    fn as_str(self) -> &'static str {
        match self {
            KeyType::Rec => "rec",
            KeyType::Ptr => "ptr",
            KeyType::Idx => "idx",
        }
    }

    fn parse(s: &str) -> Result<Self> {
        match s {
            "rec" => Ok(KeyType::Rec),
            "ptr" => Ok(KeyType::Ptr),
            "idx" => Ok(KeyType::Idx),
            _ => Err(Error::MalformedKey(format!("unknown key type {s:?}"))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxState {
    Committed,
    Uncommitted,
}

impl TxState {
    fn as_str(self) -> &'static str {
        match self {
            TxState::Committed => "com",
            TxState::Uncommitted => "unc",
        }
    }

    fn parse(s: &str) -> Result<Self> {
        match s {
            "com" => Ok(TxState::Committed),
            "unc" => Ok(TxState::Uncommitted),
            _ => Err(Error::MalformedKey(format!("unknown tx state {s:?}"))),
        }
    }
}

/// The logical key tuple. `format`/`parse` are exact inverses for any tuple
/// whose `ns`/`field`/`value` contain no `_`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Key {
    pub ktype: KeyType,
    pub state: TxState,
    pub ns: String,
    pub field: String,
    pub value: Value,
    pub xmin: TxId,
    pub xmax: TxId,
}

fn check_no_underscore(label: &str, s: &[u8]) -> Result<()> {
    if s.contains(&b'_') {
        return Err(Error::MalformedKey(format!("{label} must not contain '_'")));
    }
    Ok(())
}

impl Key {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ktype: KeyType,
        state: TxState,
        ns: impl Into<String>,
        field: impl Into<String>,
        value: Value,
        xmin: TxId,
        xmax: TxId,
    ) -> Result<Self> {
        let ns = ns.into();
        let field = field.into();
        check_no_underscore("ns", ns.as_bytes())?;
        check_no_underscore("field", field.as_bytes())?;
        check_no_underscore("value", value.as_bytes())?;
        Ok(Key { ktype, state, ns, field, value, xmin, xmax })
    }

    pub fn committed(
        ktype: KeyType,
        ns: impl Into<String>,
        field: impl Into<String>,
        value: Value,
        xmin: TxId,
        xmax: TxId,
    ) -> Result<Self> {
        Self::new(ktype, TxState::Committed, ns, field, value, xmin, xmax)
    }

    pub fn uncommitted(
        ktype: KeyType,
        ns: impl Into<String>,
        field: impl Into<String>,
        value: Value,
        xmin: TxId,
        xmax: TxId,
    ) -> Result<Self> {
        Self::new(ktype, TxState::Uncommitted, ns, field, value, xmin, xmax)
    }

    pub fn format(&self) -> String {
        match self.state {
            TxState::Committed => format!(
                "{}_com_{}_{}_{}_{}_{}",
                self.ktype.as_str(),
                self.ns,
                self.field,
                self.value,
                self.xmin,
                self.xmax
            ),
            TxState::Uncommitted => format!(
                "{}_unc_{}_{}_{}_{}_{}",
                self.ktype.as_str(),
                self.xmin,
                self.xmax,
                self.ns,
                self.field,
                self.value
            ),
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        let tokens: Vec<&str> = s.split('_').collect();
        if tokens.len() != 7 {
            return Err(Error::MalformedKey(format!(
                "expected 7 underscore-separated tokens, got {}: {s:?}",
                tokens.len()
            )));
        }

        let ktype = KeyType::parse(tokens[0])?;
        let state = TxState::parse(tokens[1])?;

        let (ns, field, value, xmin, xmax) = match state {
            TxState::Committed => {
                let xmin = tokens[5].parse::<TxId>()?;
                let xmax = tokens[6].parse::<TxId>()?;
                (tokens[2], tokens[3], tokens[4], xmin, xmax)
            }
            TxState::Uncommitted => {
                let xmin = tokens[2].parse::<TxId>()?;
                let xmax = tokens[3].parse::<TxId>()?;
                (tokens[4], tokens[5], tokens[6], xmin, xmax)
            }
        };

        Key::new(ktype, state, ns, field, Value::from(value), xmin, xmax)
    }

    /// The prefix under which every `xmin` version of one logical
    /// `(ns, field, value)` committed row sorts together.
    pub fn committed_prefix(ktype: KeyType, ns: &str, field: &str, value: &Value) -> String {
        format!("{}_com_{}_{}_{}_", ktype.as_str(), ns, field, value)
    }

    /// The prefix under which every write made by one transaction (in one
    /// namespace) sorts together -- spec.md §4.3 `PrefixUncSameTx`.
    pub fn uncommitted_tx_prefix(ktype: KeyType, ns: &str, xmin: TxId, xmax: TxId) -> String {
        format!("{}_unc_{}_{}_{}_", ktype.as_str(), xmin, xmax, ns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(state: TxState) -> Key {
        Key::new(
            KeyType::Rec,
            state,
            "users",
            "pk",
            Value::from("12"),
            TxId::new(1, 2),
            TxId::new(3, 4),
        )
        .unwrap()
    }

    #[test]
    fn round_trips_committed() {
        let k = sample(TxState::Committed);
        let s = k.format();
        assert_eq!(Key::parse(&s).unwrap(), k);
    }

    #[test]
    fn round_trips_uncommitted() {
        let k = sample(TxState::Uncommitted);
        let s = k.format();
        assert_eq!(Key::parse(&s).unwrap(), k);
    }

    #[test]
    fn committed_format_orders_by_ns_field_value_then_xmin() {
        let k = sample(TxState::Committed);
        assert_eq!(k.format(), "rec_com_users_pk_12_0000000100000002_0000000300000004");
    }

    #[test]
    fn uncommitted_format_orders_by_xmin_xmax_then_ns() {
        let k = sample(TxState::Uncommitted);
        assert_eq!(k.format(), "rec_unc_0000000100000002_0000000300000004_users_pk_12");
    }

    #[test]
    fn rejects_underscore_in_field() {
        let err = Key::new(
            KeyType::Rec,
            TxState::Committed,
            "users",
            "p_k",
            Value::from("1"),
            TxId::MIN,
            TxId::MAX,
        );
        assert!(err.is_err());
    }

    #[test]
    fn rejects_wrong_token_count() {
        assert!(Key::parse("rec_com_users_pk_12_xmin").is_err());
        assert!(Key::parse("rec_com_users_pk_12_1_2_extra").is_err());
    }

    #[test]
    fn rejects_invalid_hex_xmin() {
        assert!(Key::parse("rec_com_users_pk_12_zzzzzzzzzzzzzzzz_0000000000000001").is_err());
    }

    #[test]
    fn committed_prefix_matches_committed_format_prefix() {
        let k = sample(TxState::Committed);
        let prefix = Key::committed_prefix(KeyType::Rec, "users", "pk", &Value::from("12"));
        assert!(k.format().starts_with(&prefix));
    }

    #[test]
    fn uncommitted_tx_prefix_matches_uncommitted_format_prefix() {
        let k = sample(TxState::Uncommitted);
        let prefix =
            Key::uncommitted_tx_prefix(KeyType::Rec, "users", TxId::new(1, 2), TxId::new(3, 4));
        assert!(k.format().starts_with(&prefix));
    }
}
