use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CreditError {
    #[error("Not enough credits: {required} required, {available} available. Complete checkout to top up.")]
    Insufficient { required: u32, available: u32 },
}

/// Session-scoped credit counter. One credit buys one shot or one edit.
/// No persistence: the balance resets with the process.
#[derive(Debug, Clone)]
pub struct CreditLedger {
    balance: u32,
}

impl CreditLedger {
    pub fn new(balance: u32) -> Self {
        CreditLedger { balance }
    }

    pub fn balance(&self) -> u32 {
        self.balance
    }

    pub fn debit(&mut self, amount: u32) -> Result<(), CreditError> {
        if amount > self.balance {
            return Err(CreditError::Insufficient {
                required: amount,
                available: self.balance,
            });
        }
        self.balance -= amount;
        Ok(())
    }

    pub fn refund(&mut self, amount: u32) {
        self.balance = self.balance.saturating_add(amount);
    }

    pub fn grant(&mut self, amount: u32) {
        self.balance = self.balance.saturating_add(amount);
    }
}

/// Payment boundary. The ledger only consumes the granted integer; how the
/// provider derived it is not validated here.
pub trait PaymentProvider {
    fn purchase(&self, requested_images: u32) -> u32;
}

/// Stand-in for the real checkout: every requested credit is granted.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedCheckout;

impl PaymentProvider for SimulatedCheckout {
    fn purchase(&self, requested_images: u32) -> u32 {
        requested_images
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debit_fails_without_mutating_balance() {
        let mut ledger = CreditLedger::new(3);
        let err = ledger.debit(5).unwrap_err();
        assert_eq!(
            err,
            CreditError::Insufficient {
                required: 5,
                available: 3
            }
        );
        assert_eq!(ledger.balance(), 3);
    }

    #[test]
    fn refund_restores_a_spent_credit() {
        let mut ledger = CreditLedger::new(2);
        ledger.debit(2).unwrap();
        ledger.refund(1);
        assert_eq!(ledger.balance(), 1);
    }

    #[test]
    fn simulated_checkout_grants_what_was_requested() {
        assert_eq!(SimulatedCheckout.purchase(8), 8);
    }
}
