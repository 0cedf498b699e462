//! # Schema Primitives
//!
//! Fixed names and limits of the transaction graph schema.
//!
//! The column names follow the card transaction dataset; the labels and
//! keys are the graph schema every backend is loaded with.

/// Maximum number of purchase rows in one linking batch.
pub const BATCH_SIZE: usize = 10_000;

/// How many times the operator is asked before a reset prompt gives up.
///
/// Exhausting the attempts resolves to skip, never to reset.
pub const MAX_PROMPT_ATTEMPTS: usize = 3;

/// Relationship type created between customers and merchants by default.
pub const DEFAULT_RELATION: &str = "MADE_PURCHASE_AT";

// =============================================================================
// LABELS AND KEYS
// =============================================================================

/// Node label for card holders.
pub const CUSTOMER_LABEL: &str = "Customer";

/// Node label for merchants.
pub const MERCHANT_LABEL: &str = "Merchant";

/// Card identifier column; primary key of `Customer`.
pub const CARD_NUMBER: &str = "cc_num";

/// Merchant name column; primary key of `Merchant`.
pub const MERCHANT_NAME: &str = "merchant";

/// Transaction number column; unique per purchase.
pub const TRANSACTION_NUMBER: &str = "trans_num";

// =============================================================================
// SOURCE COLUMNS
// =============================================================================

pub const FIRST_NAME: &str = "first";
pub const LAST_NAME: &str = "last";

/// Attribute synthesized from `first` and `last`.
pub const FULL_NAME: &str = "card_holder";

pub const TRANSACTION_DATE: &str = "trans_date";
pub const TRANSACTION_TIME: &str = "trans_time";
pub const AMOUNT: &str = "amt";
pub const UNIX_TIME: &str = "unix_time";

/// Columns always read as text, whatever their cells look like.
///
/// Keys must never collapse through numeric parsing (`0e12` and `0e34` are
/// distinct transactions), and names are never numbers.
pub const TEXT_COLUMNS: [&str; 6] = [
    FIRST_NAME,
    LAST_NAME,
    MERCHANT_NAME,
    TRANSACTION_NUMBER,
    TRANSACTION_DATE,
    TRANSACTION_TIME,
];

/// Columns projected into the purchase record set.
pub const PURCHASE_COLUMNS: [&str; 7] = [
    CARD_NUMBER,
    MERCHANT_NAME,
    TRANSACTION_DATE,
    TRANSACTION_TIME,
    TRANSACTION_NUMBER,
    AMOUNT,
    UNIX_TIME,
];

/// Customer attributes loaded when no attribute list is configured.
pub const DEFAULT_CUSTOMER_ATTRIBUTES: [&str; 8] = [
    FIRST_NAME,
    LAST_NAME,
    CARD_NUMBER,
    "gender",
    "zip",
    "state",
    "job",
    "city",
];

/// Merchant attributes loaded when no attribute list is configured.
pub const DEFAULT_MERCHANT_ATTRIBUTES: [&str; 2] = [MERCHANT_NAME, "category"];

// =============================================================================
// RELATIONSHIP PROPERTIES
// =============================================================================

/// Edge property names, in the order they are written.
pub mod edge {
    pub const AMOUNT: &str = "amount";
    pub const DATE: &str = "date";
    pub const TIME: &str = "time";
    pub const TRANSACTION_NUMBER: &str = "trans_num";
    pub const TIMESTAMP: &str = "timestamp";
}
