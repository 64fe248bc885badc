//! Raw feed-record models, mirroring the Akahu API schema.
//!
//! These are wire types: fields keep the provider's shapes (signed
//! float amounts, ISO-8601 date strings) and are converted to the
//! in-memory entities by the feed importer.

use serde::{Deserialize, Serialize};

use super::AkahuId;

/// A transaction record as returned by `GET /v1/transactions` and as
/// cached in the feed-cache table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedTransaction {
    /// Feed transaction identifier (`trans_…`).
    #[serde(rename = "_id")]
    pub id: AkahuId,
    /// Feed identifier of the owning account (`acc_…`).
    #[serde(rename = "_account")]
    pub account: AkahuId,
    /// Signed amount: negative for debits, positive for credits.
    pub amount: f64,
    /// ISO-8601 timestamp.
    pub date: String,
    /// Bank-provided description line.
    pub description: String,
    /// Matched merchant, when the provider recognized one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merchant: Option<FeedMerchant>,
    /// Transaction metadata: reference strings, the other party's
    /// account number, currency conversion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<FeedMeta>,
    /// Category hierarchy, when the provider classified the
    /// transaction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<FeedCategory>,
}

/// A merchant the provider matched to a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedMerchant {
    /// Merchant identifier (`merchant_…`).
    #[serde(rename = "_id")]
    pub id: AkahuId,
    /// Merchant display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Bank-supplied transaction metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedMeta {
    /// Statement reference field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    /// Statement particulars field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub particulars: Option<String>,
    /// Statement code field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// The other party's bank account number, when the bank exposes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_account: Option<String>,
    /// Currency conversion details for foreign-currency transactions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversion: Option<FeedConversion>,
}

/// Currency conversion applied to a foreign-currency transaction.
///
/// `rate` and `fee` are decoded but not persisted onto transactions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedConversion {
    /// Original currency code.
    pub currency: String,
    /// Amount in the original currency.
    pub amount: f64,
    /// Conversion rate applied by the bank.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,
    /// Conversion fee charged by the bank.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee: Option<f64>,
}

/// Category classification of a transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedCategory {
    /// Grouping systems the category belongs to.
    #[serde(default)]
    pub groups: FeedCategoryGroups,
}

/// The grouping systems of a category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedCategoryGroups {
    /// The personal-finance grouping, the only one this pipeline reads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub personal_finance: Option<FeedCategoryGroup>,
}

/// One group within a category hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedCategoryGroup {
    /// Group display name.
    pub name: String,
}

impl FeedTransaction {
    /// The matched merchant's identifier, if any.
    #[inline]
    #[must_use]
    pub fn merchant_id(&self) -> Option<&AkahuId> {
        self.merchant.as_ref().map(|merchant| &merchant.id)
    }

    /// The personal-finance category name, if the provider classified
    /// the transaction.
    #[must_use]
    pub fn category_name(&self) -> Option<&str> {
        self.category
            .as_ref()
            .and_then(|category| category.groups.personal_finance.as_ref())
            .map(|group| group.name.as_str())
    }
}

/// An account record as returned by `GET /v1/accounts` and as cached in
/// the feed-cache table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedAccount {
    /// Feed account identifier (`acc_…`).
    #[serde(rename = "_id")]
    pub id: AkahuId,
    /// Account display name.
    pub name: String,
    /// Formatted bank account number, when the connection exposes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatted_account: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_minimal_transaction() {
        let json = r#"{
            "_id": "trans_A1",
            "_account": "acc_X",
            "amount": 50.0,
            "date": "2024-01-02T10:30:00Z",
            "description": "Coffee shop"
        }"#;
        let tx: FeedTransaction = serde_json::from_str(json).unwrap();
        assert_eq!(tx.id, AkahuId::from("trans_A1"));
        assert_eq!(tx.account, AkahuId::from("acc_X"));
        assert!((tx.amount - 50.0).abs() < f64::EPSILON);
        assert!(tx.merchant.is_none());
        assert!(tx.meta.is_none());
        assert!(tx.category_name().is_none());
    }

    #[test]
    fn deserialize_full_transaction() {
        let json = r#"{
            "_id": "trans_B2",
            "_account": "acc_X",
            "amount": -120.5,
            "date": "2024-03-04T08:15:00Z",
            "description": "AMAZON MKTPLACE REF-991",
            "merchant": { "_id": "merchant_amzn", "name": "Amazon" },
            "meta": {
                "reference": "REF-991",
                "particulars": "card-4821",
                "other_account": "12-3456-7890123-00",
                "conversion": {
                    "currency": "USD",
                    "amount": 72.99,
                    "rate": 0.6057,
                    "fee": 1.5
                }
            },
            "category": {
                "groups": { "personal_finance": { "name": "Shopping" } }
            }
        }"#;
        let tx: FeedTransaction = serde_json::from_str(json).unwrap();
        assert_eq!(tx.merchant_id(), Some(&AkahuId::from("merchant_amzn")));
        assert_eq!(tx.category_name(), Some("Shopping"));
        let meta = tx.meta.unwrap();
        assert_eq!(meta.reference.as_deref(), Some("REF-991"));
        assert_eq!(meta.code, None);
        let conversion = meta.conversion.unwrap();
        assert_eq!(conversion.currency, "USD");
        assert!((conversion.amount - 72.99).abs() < f64::EPSILON);
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let json = r#"{
            "_id": "trans_C3",
            "_account": "acc_Y",
            "_connection": "conn_1",
            "amount": 3.0,
            "date": "2024-01-01T00:00:00Z",
            "description": "x",
            "balance": 100.0,
            "type": "EFTPOS"
        }"#;
        let tx: FeedTransaction = serde_json::from_str(json).unwrap();
        assert_eq!(tx.id, AkahuId::from("trans_C3"));
    }

    #[test]
    fn feed_account_roundtrip() {
        let account = FeedAccount {
            id: AkahuId::from("acc_X"),
            name: "Everyday".to_owned(),
            formatted_account: Some("12-3456-7890123-00".to_owned()),
        };
        let json = serde_json::to_string(&account).unwrap();
        let deserialized: FeedAccount = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, account);
    }
}
