//! Net position per instrument, as seen by the venue.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::enums::PositionSide;
use crate::identifiers::{Price, Quantity};
use crate::side::Side;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetPosition {
    /// Positive when long, negative when short.
    pub signed_qty: Decimal,
    /// Average entry price of the open quantity.
    pub avg_px_open: Option<Price>,
    pub realized_pnl: Decimal,
}

impl NetPosition {
    pub fn side(&self) -> PositionSide {
        if self.signed_qty > Decimal::ZERO {
            PositionSide::Long
        } else if self.signed_qty < Decimal::ZERO {
            PositionSide::Short
        } else {
            PositionSide::Flat
        }
    }

    pub fn quantity(&self) -> Quantity {
        self.signed_qty.abs()
    }

    pub fn is_flat(&self) -> bool {
        self.signed_qty.is_zero()
    }

    /// Quantity an order on `side` may trade without increasing exposure.
    pub fn reducible_by(&self, side: Side) -> Quantity {
        match (self.side(), side) {
            (PositionSide::Long, Side::Sell) | (PositionSide::Short, Side::Buy) => self.quantity(),
            _ => Quantity::ZERO,
        }
    }

    /// Apply a fill, realizing PnL on the part that closes exposure.
    pub fn apply_fill(&mut self, side: Side, qty: Quantity, px: Price, multiplier: Decimal) {
        let signed = match side {
            Side::Buy => qty,
            Side::Sell => -qty,
        };
        let opening_same_way = self.signed_qty.is_zero()
            || (self.signed_qty > Decimal::ZERO) == (signed > Decimal::ZERO);

        if opening_same_way {
            let open = self.quantity();
            let avg = self.avg_px_open.unwrap_or(px);
            self.avg_px_open = Some((avg * open + px * qty) / (open + qty));
            self.signed_qty += signed;
            return;
        }

        let closing = qty.min(self.quantity());
        if let Some(avg) = self.avg_px_open {
            let per_unit = match self.side() {
                PositionSide::Long => px - avg,
                _ => avg - px,
            };
            self.realized_pnl += per_unit * closing * multiplier;
        }
        self.signed_qty += signed;

        if self.signed_qty.is_zero() {
            self.avg_px_open = None;
        } else if qty > closing {
            // flipped through flat: the excess opens at this fill's price
            self.avg_px_open = Some(px);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn realizes_pnl_when_reducing_and_flipping() {
        let mut pos = NetPosition::default();
        pos.apply_fill(Side::Buy, dec!(10), dec!(100), Decimal::ONE);
        pos.apply_fill(Side::Buy, dec!(10), dec!(102), Decimal::ONE);
        assert_eq!(pos.side(), PositionSide::Long);
        assert_eq!(pos.avg_px_open, Some(dec!(101)));

        pos.apply_fill(Side::Sell, dec!(5), dec!(105), Decimal::ONE);
        assert_eq!(pos.realized_pnl, dec!(20));
        assert_eq!(pos.quantity(), dec!(15));
        assert_eq!(pos.reducible_by(Side::Sell), dec!(15));
        assert_eq!(pos.reducible_by(Side::Buy), Decimal::ZERO);

        pos.apply_fill(Side::Sell, dec!(20), dec!(100), Decimal::ONE);
        assert_eq!(pos.realized_pnl, dec!(5));
        assert_eq!(pos.side(), PositionSide::Short);
        assert_eq!(pos.quantity(), dec!(5));
        assert_eq!(pos.avg_px_open, Some(dec!(100)));
    }
}
