//! Cart contents.
//!
//! A [`Cart`] maps each product to a strictly positive [`Quantity`]. A
//! quantity of zero is never stored; it means the product is absent.

use std::collections::BTreeMap;
use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};

use super::id::ProductId;

/// A strictly positive line quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quantity(NonZeroU32);

impl Quantity {
    pub const ONE: Self = Self(NonZeroU32::MIN);

    /// Returns `None` for zero.
    #[must_use]
    pub const fn new(value: u32) -> Option<Self> {
        match NonZeroU32::new(value) {
            Some(q) => Some(Self(q)),
            None => None,
        }
    }

    #[must_use]
    pub const fn get(self) -> u32 {
        self.0.get()
    }

    /// Sum of two quantities, saturating at `u32::MAX`.
    #[must_use]
    pub const fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0.get()))
    }
}

impl From<Quantity> for u32 {
    fn from(q: Quantity) -> Self {
        q.get()
    }
}

/// One product line of a cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: ProductId,
    pub quantity: Quantity,
}

/// The contents of one owner's cart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<CartLine>", into = "Vec<CartLine>")]
pub struct Cart {
    lines: BTreeMap<ProductId, Quantity>,
}

impl Cart {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Number of distinct products.
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Sum of all quantities, as shown on the header badge.
    #[must_use]
    pub fn item_count(&self) -> u64 {
        self.lines.values().map(|q| u64::from(q.get())).sum()
    }

    #[must_use]
    pub fn quantity_of(&self, product_id: ProductId) -> Option<Quantity> {
        self.lines.get(&product_id).copied()
    }

    /// Lines ordered by product id.
    pub fn lines(&self) -> impl Iterator<Item = CartLine> + '_ {
        self.lines.iter().map(|(&product_id, &quantity)| CartLine {
            product_id,
            quantity,
        })
    }

    /// Add `quantity` to the line for `product_id`, creating it if needed.
    pub fn add(&mut self, product_id: ProductId, quantity: Quantity) {
        self.lines
            .entry(product_id)
            .and_modify(|q| *q = q.saturating_add(quantity))
            .or_insert(quantity);
    }

    /// Overwrite the quantity for `product_id`; zero removes the line.
    pub fn set(&mut self, product_id: ProductId, quantity: u32) {
        match Quantity::new(quantity) {
            Some(q) => {
                self.lines.insert(product_id, q);
            }
            None => {
                self.lines.remove(&product_id);
            }
        }
    }

    pub fn remove(&mut self, product_id: ProductId) -> Option<Quantity> {
        self.lines.remove(&product_id)
    }

    /// Additive merge: every product from either cart, quantities summed.
    #[must_use]
    pub fn merged_with(&self, other: &Self) -> Self {
        let mut merged = self.clone();
        for line in other.lines() {
            merged.add(line.product_id, line.quantity);
        }
        merged
    }
}

impl From<Vec<CartLine>> for Cart {
    fn from(lines: Vec<CartLine>) -> Self {
        lines.into_iter().collect()
    }
}

impl From<Cart> for Vec<CartLine> {
    fn from(cart: Cart) -> Self {
        cart.lines().collect()
    }
}

impl FromIterator<CartLine> for Cart {
    fn from_iter<I: IntoIterator<Item = CartLine>>(iter: I) -> Self {
        let mut cart = Self::new();
        for line in iter {
            cart.add(line.product_id, line.quantity);
        }
        cart
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn cart(lines: &[(i64, u32)]) -> Cart {
        lines
            .iter()
            .map(|&(p, q)| CartLine {
                product_id: ProductId::new(p),
                quantity: Quantity::new(q).unwrap(),
            })
            .collect()
    }

    #[test]
    fn test_quantity_zero_is_none() {
        assert!(Quantity::new(0).is_none());
        assert_eq!(Quantity::new(5).unwrap().get(), 5);
    }

    #[test]
    fn test_quantity_saturates() {
        let max = Quantity::new(u32::MAX).unwrap();
        assert_eq!(max.saturating_add(Quantity::ONE).get(), u32::MAX);
    }

    #[test]
    fn test_merge_sums_quantities() {
        let guest = cart(&[(1, 2)]);
        let account = cart(&[(1, 1), (2, 3)]);
        let merged = account.merged_with(&guest);
        assert_eq!(merged, cart(&[(1, 3), (2, 3)]));
        assert_eq!(merged.item_count(), 6);
    }

    #[test]
    fn test_merge_with_empty_is_identity() {
        let account = cart(&[(4, 1)]);
        assert_eq!(account.merged_with(&Cart::new()), account);
        assert_eq!(Cart::new().merged_with(&account), account);
    }

    #[test]
    fn test_set_zero_removes() {
        let mut c = cart(&[(1, 2), (2, 1)]);
        c.set(ProductId::new(1), 0);
        assert_eq!(c, cart(&[(2, 1)]));
        c.set(ProductId::new(2), 7);
        assert_eq!(c.quantity_of(ProductId::new(2)).unwrap().get(), 7);
    }

    #[test]
    fn test_serde_as_line_list() {
        let c = cart(&[(2, 1), (1, 4)]);
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(
            json,
            serde_json::json!([
                {"product_id": 1, "quantity": 4},
                {"product_id": 2, "quantity": 1}
            ])
        );
        let back: Cart = serde_json::from_value(json).unwrap();
        assert_eq!(back, c);
        assert!(serde_json::from_str::<Cart>(r#"[{"product_id":1,"quantity":0}]"#).is_err());
    }
}
