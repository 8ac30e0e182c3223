use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Platform fee charged when no rate is configured: 2.5%.
pub const DEFAULT_FEE_BPS: u16 = 250;
/// Upper bound for an administratively set fee rate: 100%.
pub const MAX_FEE_BPS: u16 = 10_000;

const BPS_DENOMINATOR: u128 = 10_000;

/// `floor(amount * fee_bps / 10000)`, computed without intermediate overflow.
pub fn fee(amount: u128, fee_bps: u16) -> u128 {
    let bps = fee_bps as u128;
    (amount / BPS_DENOMINATOR) * bps + (amount % BPS_DENOMINATOR) * bps / BPS_DENOMINATOR
}

/// How a settled amount is divided between recipient and platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSplit {
    pub fee: u128,
    pub net: u128,
}

/// Pure fee arithmetic at a fixed basis-point rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeCalculator {
    fee_bps: u16,
}

impl FeeCalculator {
    /// Create a calculator, rejecting rates above [`MAX_FEE_BPS`].
    pub fn new(fee_bps: u16) -> Result<Self, CoreError> {
        Self::check(fee_bps)?;
        Ok(Self { fee_bps })
    }

    pub fn fee_bps(&self) -> u16 {
        self.fee_bps
    }

    /// Change the rate. Affects payments made afterwards only.
    pub fn set_fee_bps(&mut self, fee_bps: u16) -> Result<(), CoreError> {
        Self::check(fee_bps)?;
        self.fee_bps = fee_bps;
        Ok(())
    }

    pub fn fee(&self, amount: u128) -> u128 {
        fee(amount, self.fee_bps)
    }

    /// Split `amount` so that `net + fee == amount`.
    pub fn split(&self, amount: u128) -> FeeSplit {
        let fee = self.fee(amount);
        FeeSplit {
            fee,
            net: amount - fee,
        }
    }

    fn check(fee_bps: u16) -> Result<(), CoreError> {
        if fee_bps > MAX_FEE_BPS {
            return Err(CoreError::InvalidFeeBps(fee_bps as u32));
        }
        Ok(())
    }
}

impl Default for FeeCalculator {
    fn default() -> Self {
        Self {
            fee_bps: DEFAULT_FEE_BPS,
        }
    }
}
