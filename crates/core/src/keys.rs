//! Record-to-key encoding
//!
//! Relational-style records are spread over flat store keys, one key per
//! independently updated field:
//!
//! ```text
//! record field:     <tag>-<id>_<id>_..._<id>-<field>     e.g. d-3_1-next_o_id
//! whole record:     <tag>-<id>_<id>_..._<id>-            e.g. w-1-
//! secondary index:  <tag>-<id>_<id>_..._<component>      e.g. ci-3_1_BARBARABLE
//! ```
//!
//! Ids are decimal integers (history rows use a hyphen-free UUID), so `-`
//! only ever appears as the two structural delimiters. Fields may contain
//! `_` but never `-`. Encoding is therefore injective and stable across
//! processes. Callers must not pass components containing `-`.

use std::fmt::Display;
use uuid::Uuid;

/// Field names used by the TPC-C schema
pub mod field {
    /// The serialized record itself
    pub const RECORD: &str = "";
    /// Year-to-date amount (warehouse, district, stock)
    pub const YTD: &str = "ytd";
    /// District next available order number
    pub const NEXT_O_ID: &str = "next_o_id";
    /// Customer balance
    pub const BALANCE: &str = "balance";
    /// Customer year-to-date payment
    pub const YTD_PAYMENT: &str = "ytd_payment";
    /// Customer payment count
    pub const PAYMENT_CNT: &str = "payment_cnt";
    /// Customer delivery count
    pub const DELIVERY_CNT: &str = "delivery_cnt";
    /// Customer data (bad credit history)
    pub const DATA: &str = "data";
    /// Order carrier id
    pub const CARRIER_ID: &str = "carrier_id";
    /// Order-line delivery date
    pub const DELIVERY_D: &str = "delivery_d";
    /// Stock quantity
    pub const QUANTITY: &str = "quantity";
    /// Stock order count
    pub const ORDER_CNT: &str = "order_cnt";
    /// Stock remote order count
    pub const REMOTE_CNT: &str = "remote_cnt";
}

/// Delimiter between tag, id list and field
pub const PART_DELIMITER: char = '-';

/// Delimiter between ids
pub const ID_DELIMITER: char = '_';

/// Tables and secondary indexes of the schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    /// Warehouse: (w_id)
    Warehouse,
    /// District: (d_id, w_id)
    District,
    /// Customer: (c_id, d_id, w_id)
    Customer,
    /// Customer-by-last-name index: (d_id, w_id, c_last) -> list of c_id
    CustomerByLastName,
    /// History: (uuid, c_id, c_w_id, w_id)
    History,
    /// New-order: (o_id, d_id, w_id)
    NewOrder,
    /// Oldest undelivered new-order per district: (d_id, w_id) -> o_id
    NewOrderOldest,
    /// Order: (o_id, d_id, w_id)
    Order,
    /// Last order of a customer: (d_id, w_id, c_id) -> o_id
    OrderByCustomer,
    /// Order-line: (ol_number, o_id, d_id, w_id)
    OrderLine,
    /// Item: (i_id)
    Item,
    /// Stock: (i_id, w_id)
    Stock,
}

impl Table {
    /// All tables, in declaration order
    pub const ALL: [Table; 12] = [
        Table::Warehouse,
        Table::District,
        Table::Customer,
        Table::CustomerByLastName,
        Table::History,
        Table::NewOrder,
        Table::NewOrderOldest,
        Table::Order,
        Table::OrderByCustomer,
        Table::OrderLine,
        Table::Item,
        Table::Stock,
    ];

    /// Key prefix tag
    pub fn tag(&self) -> &'static str {
        match self {
            Table::Warehouse => "w",
            Table::District => "d",
            Table::Customer => "c",
            Table::CustomerByLastName => "ci",
            Table::History => "h",
            Table::NewOrder => "no",
            Table::NewOrderOldest => "noi",
            Table::Order => "o",
            Table::OrderByCustomer => "oi",
            Table::OrderLine => "ol",
            Table::Item => "i",
            Table::Stock => "s",
        }
    }

    /// Look a table up by its tag
    pub fn from_tag(tag: &str) -> Option<Table> {
        Table::ALL.iter().copied().find(|t| t.tag() == tag)
    }

    /// Whether keys of this table are aggregated index entries (no field part)
    pub fn is_index(&self) -> bool {
        matches!(
            self,
            Table::CustomerByLastName | Table::NewOrderOldest | Table::OrderByCustomer
        )
    }
}

fn join_ids<I: Display>(ids: &[I]) -> String {
    let mut out = String::new();
    for (i, id) in ids.iter().enumerate() {
        if i > 0 {
            out.push(ID_DELIMITER);
        }
        out.push_str(&id.to_string());
    }
    out
}

/// Encode a record field key: `<tag>-<ids>-<field>`
pub fn encode<I: Display>(table: Table, ids: &[I], field: &str) -> String {
    format!(
        "{}{}{}{}{}",
        table.tag(),
        PART_DELIMITER,
        join_ids(ids),
        PART_DELIMITER,
        field
    )
}

/// Encode a secondary index key: `<tag>-<ids>`
pub fn encode_index<I: Display>(table: Table, ids: &[I]) -> String {
    format!("{}{}{}", table.tag(), PART_DELIMITER, join_ids(ids))
}

/// Split a record key around its first id
///
/// Returns `(prefix, suffix)` such that `prefix + first_id + suffix` equals
/// `encode(table, [first_id, rest...], field)`. Used to build keys whose
/// leading id is only known as a future.
pub fn encode_parts<I: Display>(table: Table, rest: &[I], field: &str) -> (String, String) {
    let prefix = format!("{}{}", table.tag(), PART_DELIMITER);
    let mut suffix = String::new();
    for id in rest {
        suffix.push(ID_DELIMITER);
        suffix.push_str(&id.to_string());
    }
    suffix.push(PART_DELIMITER);
    suffix.push_str(field);
    (prefix, suffix)
}

/// Components of a decoded key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedKey {
    /// Table the key belongs to
    pub table: Table,
    /// Id components, in encoding order
    pub ids: Vec<String>,
    /// Field name; None for index keys
    pub field: Option<String>,
}

/// Decode a key produced by [`encode`] or [`encode_index`]
pub fn decode(key: &str) -> Option<DecodedKey> {
    let (tag, rest) = key.split_once(PART_DELIMITER)?;
    let table = Table::from_tag(tag)?;
    let (ids, field) = match rest.split_once(PART_DELIMITER) {
        Some((ids, field)) => (ids, Some(field.to_string())),
        None => (rest, None),
    };
    Some(DecodedKey {
        table,
        ids: ids.split(ID_DELIMITER).map(str::to_string).collect(),
        field,
    })
}

/// `w-<w_id>-<field>`
pub fn warehouse(w_id: u64, field: &str) -> String {
    encode(Table::Warehouse, &[w_id], field)
}

/// `d-<d_id>_<w_id>-<field>`
pub fn district(d_id: u64, w_id: u64, field: &str) -> String {
    encode(Table::District, &[d_id, w_id], field)
}

/// `c-<c_id>_<d_id>_<w_id>-<field>`
pub fn customer(c_id: u64, d_id: u64, w_id: u64, field: &str) -> String {
    encode(Table::Customer, &[c_id, d_id, w_id], field)
}

/// `ci-<d_id>_<w_id>_<c_last>`: maps to the list of matching customer ids
pub fn customer_by_last_name(d_id: u64, w_id: u64, c_last: &str) -> String {
    encode_index(
        Table::CustomerByLastName,
        &[d_id.to_string(), w_id.to_string(), c_last.to_string()],
    )
}

/// `h-<uuid>_<c_id>_<c_w_id>_<w_id>-<field>`
pub fn history(h_id: &Uuid, c_id: u64, c_w_id: u64, w_id: u64, field: &str) -> String {
    let h = h_id.simple().to_string();
    encode(
        Table::History,
        &[h, c_id.to_string(), c_w_id.to_string(), w_id.to_string()],
        field,
    )
}

/// `no-<o_id>_<d_id>_<w_id>-<field>`
pub fn new_order(o_id: u64, d_id: u64, w_id: u64, field: &str) -> String {
    encode(Table::NewOrder, &[o_id, d_id, w_id], field)
}

/// `noi-<d_id>_<w_id>`: maps to the oldest undelivered order id
pub fn new_order_oldest(d_id: u64, w_id: u64) -> String {
    encode_index(Table::NewOrderOldest, &[d_id, w_id])
}

/// `o-<o_id>_<d_id>_<w_id>-<field>`
pub fn order(o_id: u64, d_id: u64, w_id: u64, field: &str) -> String {
    encode(Table::Order, &[o_id, d_id, w_id], field)
}

/// `oi-<d_id>_<w_id>_<c_id>`: maps to the customer's last order id
pub fn order_by_customer(d_id: u64, w_id: u64, c_id: u64) -> String {
    encode_index(Table::OrderByCustomer, &[d_id, w_id, c_id])
}

/// `ol-<ol_number>_<o_id>_<d_id>_<w_id>-<field>`
pub fn order_line(ol_number: u64, o_id: u64, d_id: u64, w_id: u64, field: &str) -> String {
    encode(Table::OrderLine, &[ol_number, o_id, d_id, w_id], field)
}

/// `i-<i_id>-<field>`
pub fn item(i_id: u64, field: &str) -> String {
    encode(Table::Item, &[i_id], field)
}

/// `s-<i_id>_<w_id>-<field>`
pub fn stock(i_id: u64, w_id: u64, field: &str) -> String {
    encode(Table::Stock, &[i_id, w_id], field)
}
