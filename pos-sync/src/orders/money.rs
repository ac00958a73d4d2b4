//! Money calculation utilities using rust_decimal for precision
//!
//! GST is applied to the order as a whole. Two modes exist:
//!
//! | Mode | subtotal | tax | total |
//! |------|----------|-----|-------|
//! | exclusive | gross | subtotal × rate | subtotal + tax |
//! | inclusive | gross | total − total / (1 + rate) | gross |
//!
//! where `gross = Σ unit_price × quantity` and `rate = gst_percentage / 100`.
//! Results are rounded to 2 decimal places, half away from zero.

use super::error::{OrderError, OrderResult};
use rust_decimal::prelude::*;
use shared::order::{OrderItem, OrderType};
use std::fmt;
use std::str::FromStr;

/// Rounding strategy for monetary values (2 decimal places, half-up)
const DECIMAL_PLACES: u32 = 2;

/// Maximum allowed price per item
const MAX_PRICE: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 0);
/// Maximum allowed quantity per item
const MAX_QUANTITY: u32 = 9999;

/// Round a monetary value to 2 decimal places
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
}

/// How GST relates to menu prices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GstMode {
    /// Menu prices already include GST
    Inclusive,
    /// GST is added on top of menu prices
    Exclusive,
}

impl FromStr for GstMode {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inclusive" => Ok(GstMode::Inclusive),
            "exclusive" => Ok(GstMode::Exclusive),
            other => Err(OrderError::configuration(format!(
                "gst_mode must be 'inclusive' or 'exclusive', got '{other}'"
            ))),
        }
    }
}

impl fmt::Display for GstMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GstMode::Inclusive => write!(f, "inclusive"),
            GstMode::Exclusive => write!(f, "exclusive"),
        }
    }
}

/// Validated GST settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GstConfig {
    mode: GstMode,
    percentage: Decimal,
}

impl GstConfig {
    /// `percentage` is in percent (5 means 5%) and must lie in [0, 100)
    pub fn new(mode: GstMode, percentage: Decimal) -> OrderResult<Self> {
        if percentage.is_sign_negative() || percentage >= Decimal::ONE_HUNDRED {
            return Err(OrderError::configuration(format!(
                "gst_percentage must be in [0, 100), got {percentage}"
            )));
        }
        Ok(Self { mode, percentage })
    }

    /// Parse both settings from their textual form (e.g. environment values)
    pub fn parse(mode: &str, percentage: &str) -> OrderResult<Self> {
        let mode = mode.parse::<GstMode>()?;
        let percentage = Decimal::from_str(percentage.trim()).map_err(|e| {
            OrderError::configuration(format!("gst_percentage '{percentage}' is not a number: {e}"))
        })?;
        Self::new(mode, percentage)
    }

    pub fn mode(&self) -> GstMode {
        self.mode
    }

    pub fn percentage(&self) -> Decimal {
        self.percentage
    }

    /// Fractional rate, e.g. 0.05 for 5%
    pub fn rate(&self) -> Decimal {
        self.percentage / Decimal::ONE_HUNDRED
    }
}

/// Computed order totals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Totals {
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

/// Compute subtotal, tax and total for a set of lines
pub fn compute_totals(items: &[OrderItem], gst: &GstConfig) -> Totals {
    let gross: Decimal = items.iter().map(OrderItem::line_total).sum();
    let rate = gst.rate();

    match gst.mode() {
        GstMode::Exclusive => {
            let subtotal = round_money(gross);
            let tax = round_money(subtotal * rate);
            Totals {
                subtotal,
                tax,
                total: subtotal + tax,
            }
        }
        GstMode::Inclusive => {
            let total = round_money(gross);
            let tax = round_money(total - total / (Decimal::ONE + rate));
            Totals {
                subtotal: total,
                tax,
                total,
            }
        }
    }
}

/// Validate a single cart line
pub fn validate_item(item: &OrderItem) -> OrderResult<()> {
    if item.menu_item_id.trim().is_empty() {
        return Err(OrderError::validation("menu_item_id must not be empty"));
    }
    if item.quantity == 0 {
        return Err(OrderError::validation(format!(
            "quantity must be at least 1 for {}",
            item.menu_item_id
        )));
    }
    if item.quantity > MAX_QUANTITY {
        return Err(OrderError::validation(format!(
            "quantity exceeds maximum allowed ({MAX_QUANTITY}), got {}",
            item.quantity
        )));
    }
    if item.unit_price.is_sign_negative() {
        return Err(OrderError::validation(format!(
            "unit_price must be non-negative, got {}",
            item.unit_price
        )));
    }
    if item.unit_price > MAX_PRICE {
        return Err(OrderError::validation(format!(
            "unit_price exceeds maximum allowed ({MAX_PRICE}), got {}",
            item.unit_price
        )));
    }
    Ok(())
}

/// Validate the dine-in constraints of an order type
pub fn validate_order_type(order_type: &OrderType) -> OrderResult<()> {
    if let OrderType::DineIn {
        table_reference,
        people_count,
    } = order_type
    {
        if table_reference.trim().is_empty() {
            return Err(OrderError::validation(
                "dine-in orders require a table reference",
            ));
        }
        if *people_count < 1 {
            return Err(OrderError::validation(
                "dine-in orders require at least 1 person",
            ));
        }
    }
    Ok(())
}

/// Validate lines and merge duplicates
///
/// Lines with the same menu item and variant collapse into the first one:
/// quantities are summed, the first line's price and position are kept, and a
/// later note fills an empty one.
pub fn normalize_items(items: Vec<OrderItem>) -> OrderResult<Vec<OrderItem>> {
    if items.is_empty() {
        return Err(OrderError::validation("order must contain at least one item"));
    }

    let mut merged: Vec<OrderItem> = Vec::with_capacity(items.len());
    for item in items {
        validate_item(&item)?;
        match merged.iter_mut().find(|line| line.same_line(&item)) {
            Some(line) => {
                line.quantity = line
                    .quantity
                    .checked_add(item.quantity)
                    .filter(|quantity| *quantity <= MAX_QUANTITY)
                    .ok_or_else(|| {
                        OrderError::validation(format!(
                            "quantity exceeds maximum allowed ({MAX_QUANTITY}) for {}",
                            line.menu_item_id
                        ))
                    })?;
                if line.notes.is_none() {
                    line.notes = item.notes;
                }
            }
            None => merged.push(item),
        }
    }

    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, quantity: u32, price: Decimal) -> OrderItem {
        OrderItem::new(id, quantity, price)
    }

    fn gst(mode: GstMode, percent: i64) -> GstConfig {
        GstConfig::new(mode, Decimal::from(percent)).unwrap()
    }

    #[test]
    fn test_exclusive_five_percent() {
        let totals = compute_totals(&[item("thali", 1, Decimal::from(100))], &gst(GstMode::Exclusive, 5));
        assert_eq!(totals.subtotal, Decimal::from(100));
        assert_eq!(totals.tax, Decimal::from(5));
        assert_eq!(totals.total, Decimal::from(105));
    }

    #[test]
    fn test_inclusive_five_percent() {
        let totals = compute_totals(&[item("thali", 1, Decimal::from(105))], &gst(GstMode::Inclusive, 5));
        assert_eq!(totals.subtotal, Decimal::from(105));
        assert_eq!(totals.total, Decimal::from(105));
        assert_eq!(totals.tax, Decimal::from(5));
    }

    #[test]
    fn test_totals_consistent_across_rates() {
        let items = vec![
            item("chai", 3, Decimal::new(1250, 2)),
            item("samosa", 2, Decimal::new(1999, 2)),
        ];
        for percent in ["0", "5", "12", "18", "28", "99.5"] {
            let pct = Decimal::from_str(percent).unwrap();

            let exclusive = compute_totals(&items, &GstConfig::new(GstMode::Exclusive, pct).unwrap());
            assert_eq!(exclusive.total, exclusive.subtotal + exclusive.tax);
            assert_eq!(exclusive.tax, round_money(exclusive.subtotal * pct / Decimal::ONE_HUNDRED));

            let inclusive = compute_totals(&items, &GstConfig::new(GstMode::Inclusive, pct).unwrap());
            assert_eq!(inclusive.subtotal, inclusive.total);
            assert!(inclusive.tax >= Decimal::ZERO);
            assert!(inclusive.tax <= inclusive.total);
            // Net amount re-taxed lands back on the gross, within a cent
            let net = inclusive.total - inclusive.tax;
            let regrossed = round_money(net * (Decimal::ONE + pct / Decimal::ONE_HUNDRED));
            assert!((regrossed - inclusive.total).abs() <= Decimal::new(1, 2));
        }
    }

    #[test]
    fn test_zero_rate_has_no_tax() {
        let items = [item("water", 1, Decimal::from(20))];
        for mode in [GstMode::Inclusive, GstMode::Exclusive] {
            let totals = compute_totals(&items, &gst(mode, 0));
            assert_eq!(totals.tax, Decimal::ZERO);
            assert_eq!(totals.total, Decimal::from(20));
        }
    }

    #[test]
    fn test_gst_mode_parse() {
        assert_eq!("Inclusive".parse::<GstMode>().unwrap(), GstMode::Inclusive);
        assert_eq!(" exclusive ".parse::<GstMode>().unwrap(), GstMode::Exclusive);
        assert!(matches!(
            "compound".parse::<GstMode>(),
            Err(OrderError::Configuration(_))
        ));
    }

    #[test]
    fn test_gst_percentage_bounds() {
        assert!(GstConfig::new(GstMode::Exclusive, Decimal::from(-1)).is_err());
        assert!(GstConfig::new(GstMode::Exclusive, Decimal::ONE_HUNDRED).is_err());
        assert!(matches!(
            GstConfig::parse("exclusive", "five"),
            Err(OrderError::Configuration(_))
        ));
        let config = GstConfig::parse("inclusive", "18").unwrap();
        assert_eq!(config.rate(), Decimal::new(18, 2));
    }

    #[test]
    fn test_normalize_merges_same_line() {
        let items = vec![
            item("lassi", 1, Decimal::from(60)).with_variant("sweet"),
            item("naan", 2, Decimal::from(40)),
            item("lassi", 2, Decimal::from(60))
                .with_variant("sweet")
                .with_notes("less ice"),
            item("lassi", 1, Decimal::from(60)).with_variant("salted"),
        ];
        let merged = normalize_items(items).unwrap();
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0].menu_item_id, "lassi");
        assert_eq!(merged[0].quantity, 3);
        assert_eq!(merged[0].notes.as_deref(), Some("less ice"));
        assert_eq!(merged[1].menu_item_id, "naan");
        assert_eq!(merged[2].variant_name.as_deref(), Some("salted"));
    }

    #[test]
    fn test_normalize_rejects_bad_lines() {
        assert!(matches!(normalize_items(vec![]), Err(OrderError::Validation(_))));
        assert!(normalize_items(vec![item("naan", 0, Decimal::from(40))]).is_err());
        assert!(normalize_items(vec![item("naan", 1, Decimal::from(-40))]).is_err());
        assert!(normalize_items(vec![item(" ", 1, Decimal::from(40))]).is_err());
    }

    #[test]
    fn test_normalize_rejects_merged_quantity_over_limit() {
        let items = vec![
            item("naan", MAX_QUANTITY, Decimal::from(40)),
            item("naan", 1, Decimal::from(40)),
        ];
        assert!(matches!(normalize_items(items), Err(OrderError::Validation(_))));

        let items = vec![
            item("naan", MAX_QUANTITY - 1, Decimal::from(40)),
            item("naan", 1, Decimal::from(40)),
        ];
        assert_eq!(normalize_items(items).unwrap()[0].quantity, MAX_QUANTITY);
    }

    #[test]
    fn test_validate_dine_in() {
        assert!(validate_order_type(&OrderType::dine_in("T1", 2)).is_ok());
        assert!(validate_order_type(&OrderType::dine_in("", 2)).is_err());
        assert!(validate_order_type(&OrderType::dine_in("T1", 0)).is_err());
        assert!(validate_order_type(&OrderType::Takeaway).is_ok());
        assert!(validate_order_type(&OrderType::Delivery).is_ok());
    }
}
