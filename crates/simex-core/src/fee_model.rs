//! Commission models.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::enums::LiquiditySide;
use crate::identifiers::{Price, Quantity};
use crate::instrument::Instrument;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeeModel {
    /// Notional times the instrument's maker or taker rate.
    #[default]
    MakerTaker,
    /// Flat commission per fill, or once per order with `charge_once`.
    Fixed {
        commission: Decimal,
        #[serde(default)]
        charge_once: bool,
    },
    Zero,
}

impl FeeModel {
    /// Commission for one fill; `first_fill` is whether the order had no
    /// fills before this one.
    pub fn commission(
        &self,
        instrument: &Instrument,
        last_qty: Quantity,
        last_px: Price,
        liquidity_side: LiquiditySide,
        first_fill: bool,
    ) -> Decimal {
        match self {
            FeeModel::MakerTaker => {
                let rate = match liquidity_side {
                    LiquiditySide::Maker => instrument.maker_fee,
                    LiquiditySide::Taker => instrument.taker_fee,
                };
                instrument.notional(last_qty, last_px) * rate
            }
            FeeModel::Fixed {
                commission,
                charge_once,
            } => {
                if *charge_once && !first_fill {
                    Decimal::ZERO
                } else {
                    *commission
                }
            }
            FeeModel::Zero => Decimal::ZERO,
        }
    }
}
