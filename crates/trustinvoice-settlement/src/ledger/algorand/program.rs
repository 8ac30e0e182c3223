//! The invoice application program.
//!
//! Global state layout: `creator` (bytes), `total_invoices` (uint), and per
//! invoice `invoice_<id>_amount`, `_due_date`, `_paid`, `_refunded` (uint)
//! plus `_recipient`, `_creator`, `_payer` (bytes).
//!
//! Methods (first application argument):
//! - `create_invoice(id, amount, due_date, recipient)`
//! - `pay_invoice(id)`, grouped with a payment of exactly `amount` from the
//!   caller to `recipient` at the next group index
//! - `get_invoice(id)`, logs `amount` and `paid`
//! - `refund_invoice(id)`, creator only; pays `amount` back to the payer from
//!   the application account via an inner payment

use std::collections::BTreeMap;
use trustinvoice_core::{InvoiceEvent, InvoiceStateMachine, InvoiceStatus};
use trustinvoice_crypto::application_address;

use super::{
    AlgorandTransaction, ApplicationInfo, InnerPayment, TealKeyValue, TealValue, TxnKind,
    MAX_GLOBAL_SCHEMA, MAX_KEY_LEN, MIN_TXN_FEE,
};
use base64::Engine as _;

pub const METHOD_CREATE: &[u8] = b"create_invoice";
pub const METHOD_PAY: &[u8] = b"pay_invoice";
pub const METHOD_GET: &[u8] = b"get_invoice";
pub const METHOD_REFUND: &[u8] = b"refund_invoice";

/// Global ints and byte slices each invoice occupies.
pub const INTS_PER_INVOICE: u64 = 4;
pub const BYTES_PER_INVOICE: u64 = 3;

/// Logic rejection reasons.
pub mod reject {
    pub const ALREADY_EXISTS: &str = "invoice already exists";
    pub const NOT_FOUND: &str = "invoice does not exist";
    pub const ZERO_AMOUNT: &str = "amount must be positive";
    pub const DUE_DATE_PASSED: &str = "due date must be in the future";
    pub const ALREADY_PAID: &str = "invoice already paid";
    pub const MISSING_PAYMENT: &str = "expected payment transaction after application call";
    pub const WRONG_SENDER: &str = "payment sender does not match application caller";
    pub const WRONG_RECEIVER: &str = "payment receiver does not match invoice recipient";
    pub const WRONG_AMOUNT: &str = "payment amount does not match invoice amount";
    pub const NOT_CREATOR: &str = "only the invoice creator can refund";
    pub const NOT_PAID: &str = "invoice not paid";
    pub const ALREADY_REFUNDED: &str = "invoice already refunded";
    pub const INNER_FEE: &str = "fee too low to cover inner transaction";
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum StateValue {
    Uint(u64),
    Bytes(Vec<u8>),
}

/// Execution context of one application call.
pub(crate) struct CallContext<'a> {
    pub sender: &'a str,
    pub fee: u64,
    pub group: &'a [AlgorandTransaction],
    pub index: usize,
    pub now: u64,
}

/// Side effects the ledger applies after a successful call.
#[derive(Debug, Default)]
pub(crate) struct Effects {
    pub logs: Vec<Vec<u8>>,
    pub inner_payments: Vec<InnerPayment>,
}

#[derive(Debug, Clone)]
pub(crate) struct Application {
    id: u64,
    creator: String,
    global_ints: u64,
    global_bytes: u64,
    global: BTreeMap<Vec<u8>, StateValue>,
}

fn assert(condition: bool, reason: &str) -> Result<(), String> {
    if condition {
        Ok(())
    } else {
        Err(format!("logic eval error: assert failed: {}", reason))
    }
}

fn field_key(invoice_id: &[u8], field: &str) -> Vec<u8> {
    let mut key = b"invoice_".to_vec();
    key.extend_from_slice(invoice_id);
    key.push(b'_');
    key.extend_from_slice(field.as_bytes());
    key
}

fn btoi(arg: &[u8]) -> Result<u64, String> {
    let bytes: [u8; 8] = arg
        .try_into()
        .map_err(|_| "logic eval error: btoi arg too long".to_string())?;
    Ok(u64::from_be_bytes(bytes))
}

impl Application {
    pub fn create(id: u64, creator: &str, global_ints: u64, global_bytes: u64) -> Result<Self, String> {
        if global_ints + global_bytes > MAX_GLOBAL_SCHEMA {
            return Err(format!(
                "global schema of {} entries exceeds {}",
                global_ints + global_bytes,
                MAX_GLOBAL_SCHEMA
            ));
        }
        let mut app = Self {
            id,
            creator: creator.to_string(),
            global_ints,
            global_bytes,
            global: BTreeMap::new(),
        };
        app.put(b"creator".to_vec(), StateValue::Bytes(creator.as_bytes().to_vec()))?;
        app.put(b"total_invoices".to_vec(), StateValue::Uint(0))?;
        Ok(app)
    }

    pub fn address(&self) -> String {
        application_address(self.id)
    }

    /// algod view of the application.
    pub fn info(&self) -> ApplicationInfo {
        let engine = base64::engine::general_purpose::STANDARD;
        ApplicationInfo {
            id: self.id,
            creator: self.creator.clone(),
            address: self.address(),
            global_ints: self.global_ints,
            global_bytes: self.global_bytes,
            global_state: self
                .global
                .iter()
                .map(|(key, value)| TealKeyValue {
                    key: engine.encode(key),
                    value: match value {
                        StateValue::Uint(v) => TealValue::uint(*v),
                        StateValue::Bytes(b) => TealValue::bytes(b),
                    },
                })
                .collect(),
        }
    }

    pub fn call(&mut self, ctx: &CallContext<'_>, args: &[Vec<u8>]) -> Result<Effects, String> {
        let (method, rest) = args
            .split_first()
            .ok_or_else(|| "logic eval error: missing method argument".to_string())?;
        let invoice_id = rest
            .first()
            .ok_or_else(|| "logic eval error: missing invoice id".to_string())?;

        match method.as_slice() {
            METHOD_CREATE => {
                let [_, amount, due_date, recipient] = rest else {
                    return Err("logic eval error: create_invoice takes 4 arguments".into());
                };
                self.create_invoice(ctx, invoice_id, btoi(amount)?, btoi(due_date)?, recipient)
            }
            METHOD_PAY => self.pay_invoice(ctx, invoice_id),
            METHOD_GET => self.get_invoice(invoice_id),
            METHOD_REFUND => self.refund_invoice(ctx, invoice_id),
            _ => Err("logic eval error: unknown method".into()),
        }
    }

    fn create_invoice(
        &mut self,
        ctx: &CallContext<'_>,
        id: &[u8],
        amount: u64,
        due_date: u64,
        recipient: &[u8],
    ) -> Result<Effects, String> {
        assert(!self.global.contains_key(&field_key(id, "amount")), reject::ALREADY_EXISTS)?;
        assert(amount > 0, reject::ZERO_AMOUNT)?;
        assert(due_date > ctx.now, reject::DUE_DATE_PASSED)?;

        self.put(field_key(id, "amount"), StateValue::Uint(amount))?;
        self.put(field_key(id, "due_date"), StateValue::Uint(due_date))?;
        self.put(field_key(id, "recipient"), StateValue::Bytes(recipient.to_vec()))?;
        self.put(
            field_key(id, "creator"),
            StateValue::Bytes(ctx.sender.as_bytes().to_vec()),
        )?;
        self.put(field_key(id, "paid"), StateValue::Uint(0))?;
        let total = self.uint(b"total_invoices").unwrap_or(0);
        self.put(b"total_invoices".to_vec(), StateValue::Uint(total + 1))?;
        Ok(Effects::default())
    }

    fn pay_invoice(&mut self, ctx: &CallContext<'_>, id: &[u8]) -> Result<Effects, String> {
        let amount = self
            .uint(&field_key(id, "amount"))
            .ok_or_else(|| format!("logic eval error: {}", reject::NOT_FOUND))?;
        assert(self.uint(&field_key(id, "paid")) != Some(1), reject::ALREADY_PAID)?;

        let Some(payment) = ctx.group.get(ctx.index + 1) else {
            return Err(format!("logic eval error: assert failed: {}", reject::MISSING_PAYMENT));
        };
        let TxnKind::Payment {
            receiver,
            amount: paid_amount,
        } = &payment.kind
        else {
            return Err(format!("logic eval error: assert failed: {}", reject::MISSING_PAYMENT));
        };
        let recipient = self.bytes(&field_key(id, "recipient")).unwrap_or_default();
        assert(payment.sender == ctx.sender, reject::WRONG_SENDER)?;
        assert(receiver.as_bytes() == recipient.as_slice(), reject::WRONG_RECEIVER)?;
        assert(*paid_amount == amount, reject::WRONG_AMOUNT)?;

        self.advance(id, InvoiceEvent::PaymentSettled)?;
        self.put(
            field_key(id, "payer"),
            StateValue::Bytes(ctx.sender.as_bytes().to_vec()),
        )?;
        Ok(Effects::default())
    }

    fn get_invoice(&self, id: &[u8]) -> Result<Effects, String> {
        let amount = self
            .uint(&field_key(id, "amount"))
            .ok_or_else(|| format!("logic eval error: {}", reject::NOT_FOUND))?;
        let paid = self.uint(&field_key(id, "paid")).unwrap_or(0);
        Ok(Effects {
            logs: vec![amount.to_be_bytes().to_vec(), paid.to_be_bytes().to_vec()],
            inner_payments: Vec::new(),
        })
    }

    fn refund_invoice(&mut self, ctx: &CallContext<'_>, id: &[u8]) -> Result<Effects, String> {
        let amount = self
            .uint(&field_key(id, "amount"))
            .ok_or_else(|| format!("logic eval error: {}", reject::NOT_FOUND))?;
        let creator = self.bytes(&field_key(id, "creator")).unwrap_or_default();
        assert(ctx.sender.as_bytes() == creator.as_slice(), reject::NOT_CREATOR)?;
        assert(self.uint(&field_key(id, "paid")) == Some(1), reject::NOT_PAID)?;
        assert(self.uint(&field_key(id, "refunded")) != Some(1), reject::ALREADY_REFUNDED)?;
        assert(ctx.fee >= 2 * MIN_TXN_FEE, reject::INNER_FEE)?;

        let payer = self.bytes(&field_key(id, "payer")).unwrap_or_default();
        let payer = String::from_utf8(payer)
            .map_err(|_| "logic eval error: payer is not an address".to_string())?;

        self.advance(id, InvoiceEvent::Refunded)?;
        Ok(Effects {
            logs: Vec::new(),
            inner_payments: vec![InnerPayment {
                sender: self.address(),
                receiver: payer,
                amount,
            }],
        })
    }

    fn status(&self, id: &[u8]) -> InvoiceStatus {
        let flag = |field: &str| self.uint(&field_key(id, field)) == Some(1);
        InvoiceStatus::from_flags(flag("paid"), flag("refunded"), false, false)
    }

    /// Record a lifecycle step, rejecting any the state machine does not allow.
    fn advance(&mut self, id: &[u8], event: InvoiceEvent) -> Result<(), String> {
        let next = InvoiceStateMachine::transition(self.status(id), event)
            .map_err(|e| format!("logic eval error: {}", e))?;
        match next {
            InvoiceStatus::Paid => self.put(field_key(id, "paid"), StateValue::Uint(1)),
            InvoiceStatus::Refunded => self.put(field_key(id, "refunded"), StateValue::Uint(1)),
            _ => Ok(()),
        }
    }

    fn uint(&self, key: &[u8]) -> Option<u64> {
        match self.global.get(key) {
            Some(StateValue::Uint(v)) => Some(*v),
            _ => None,
        }
    }

    fn bytes(&self, key: &[u8]) -> Option<Vec<u8>> {
        match self.global.get(key) {
            Some(StateValue::Bytes(b)) => Some(b.clone()),
            _ => None,
        }
    }

    /// `app_global_put`, enforcing key length and the declared schema.
    fn put(&mut self, key: Vec<u8>, value: StateValue) -> Result<(), String> {
        if key.len() > MAX_KEY_LEN {
            return Err(format!(
                "logic eval error: key too long: length was {}, maximum is {}",
                key.len(),
                MAX_KEY_LEN
            ));
        }
        self.global.insert(key, value);
        let ints = self
            .global
            .values()
            .filter(|v| matches!(v, StateValue::Uint(_)))
            .count() as u64;
        let bytes = self.global.len() as u64 - ints;
        if ints > self.global_ints {
            return Err(format!(
                "store integer count {} exceeds schema integer count {}",
                ints, self.global_ints
            ));
        }
        if bytes > self.global_bytes {
            return Err(format!(
                "store bytes count {} exceeds schema bytes count {}",
                bytes, self.global_bytes
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::algorand::SuggestedParams;

    const ALICE: &str = "ALICE";
    const BOB: &str = "BOB";
    const CAROL: &str = "CAROL";

    fn app() -> Application {
        Application::create(7, ALICE, 1 + 4 * INTS_PER_INVOICE, 1 + 4 * BYTES_PER_INVOICE).unwrap()
    }

    fn params() -> SuggestedParams {
        SuggestedParams {
            fee: 1_000,
            first_valid: 1,
            last_valid: 1_001,
            genesis_id: "devnet-v1".into(),
        }
    }

    fn app_call(sender: &str, args: Vec<Vec<u8>>) -> AlgorandTransaction {
        AlgorandTransaction::new(sender, &params(), TxnKind::ApplicationCall { app_id: 7, args })
    }

    fn payment(sender: &str, receiver: &str, amount: u64) -> AlgorandTransaction {
        AlgorandTransaction::new(
            sender,
            &params(),
            TxnKind::Payment {
                receiver: receiver.into(),
                amount,
            },
        )
    }

    fn call(app: &mut Application, group: &[AlgorandTransaction], fee: u64) -> Result<Effects, String> {
        let TxnKind::ApplicationCall { args, .. } = &group[0].kind else {
            panic!("first transaction must be an application call");
        };
        let ctx = CallContext {
            sender: &group[0].sender,
            fee,
            group,
            index: 0,
            now: 100,
        };
        app.call(&ctx, args)
    }

    fn create_args(id: &str, amount: u64, due: u64, recipient: &str) -> Vec<Vec<u8>> {
        vec![
            METHOD_CREATE.to_vec(),
            id.as_bytes().to_vec(),
            amount.to_be_bytes().to_vec(),
            due.to_be_bytes().to_vec(),
            recipient.as_bytes().to_vec(),
        ]
    }

    fn created() -> Application {
        let mut app = app();
        call(&mut app, &[app_call(ALICE, create_args("INV-1", 50, 500, BOB))], 1_000).unwrap();
        app
    }

    #[test]
    fn test_create_and_get() {
        let mut app = created();
        let effects = call(
            &mut app,
            &[app_call(CAROL, vec![METHOD_GET.to_vec(), b"INV-1".to_vec()])],
            1_000,
        )
        .unwrap();
        assert_eq!(effects.logs[0], 50u64.to_be_bytes().to_vec());
        assert_eq!(effects.logs[1], 0u64.to_be_bytes().to_vec());
        assert_eq!(app.uint(b"total_invoices"), Some(1));
        assert!(app.info().global("invoice_INV-1_recipient").is_some());
    }

    #[test]
    fn test_duplicate_and_past_due_rejected() {
        let mut app = created();
        let err = call(&mut app, &[app_call(ALICE, create_args("INV-1", 50, 500, BOB))], 1_000).unwrap_err();
        assert!(err.contains(reject::ALREADY_EXISTS));
        let err = call(&mut app, &[app_call(ALICE, create_args("INV-2", 50, 100, BOB))], 1_000).unwrap_err();
        assert!(err.contains(reject::DUE_DATE_PASSED));
    }

    #[test]
    fn test_pay_requires_matching_payment() {
        let mut app = created();
        let pay = || app_call(CAROL, vec![METHOD_PAY.to_vec(), b"INV-1".to_vec()]);

        let err = call(&mut app, &[pay()], 1_000).unwrap_err();
        assert!(err.contains(reject::MISSING_PAYMENT));
        let err = call(&mut app, &[pay(), payment(CAROL, CAROL, 50)], 1_000).unwrap_err();
        assert!(err.contains(reject::WRONG_RECEIVER));
        let err = call(&mut app, &[pay(), payment(CAROL, BOB, 49)], 1_000).unwrap_err();
        assert!(err.contains(reject::WRONG_AMOUNT));

        call(&mut app, &[pay(), payment(CAROL, BOB, 50)], 1_000).unwrap();
        assert_eq!(app.bytes(&field_key(b"INV-1", "payer")), Some(CAROL.as_bytes().to_vec()));
        assert_eq!(app.status(b"INV-1"), InvoiceStatus::Paid);

        let err = call(&mut app, &[pay(), payment(CAROL, BOB, 50)], 1_000).unwrap_err();
        assert!(err.contains(reject::ALREADY_PAID));
    }

    #[test]
    fn test_pay_rejects_payment_funded_by_another_account() {
        let mut app = created();
        let pay = app_call(CAROL, vec![METHOD_PAY.to_vec(), b"INV-1".to_vec()]);
        let err = call(&mut app, &[pay, payment(ALICE, BOB, 50)], 1_000).unwrap_err();
        assert!(err.contains(reject::WRONG_SENDER), "{err}");
        assert_eq!(app.bytes(&field_key(b"INV-1", "payer")), None);
        assert_eq!(app.status(b"INV-1"), InvoiceStatus::Created);
    }

    #[test]
    fn test_refunded_invoice_cannot_advance() {
        let mut app = created();
        let pay = app_call(CAROL, vec![METHOD_PAY.to_vec(), b"INV-1".to_vec()]);
        call(&mut app, &[pay, payment(CAROL, BOB, 50)], 1_000).unwrap();
        let refund = app_call(ALICE, vec![METHOD_REFUND.to_vec(), b"INV-1".to_vec()]);
        call(&mut app, &[refund], 2_000).unwrap();
        assert_eq!(app.status(b"INV-1"), InvoiceStatus::Refunded);

        let err = app.advance(b"INV-1", InvoiceEvent::Refunded).unwrap_err();
        assert!(err.contains("invalid state transition"), "{err}");
        let err = app.advance(b"INV-1", InvoiceEvent::PaymentSettled).unwrap_err();
        assert!(err.contains("invalid state transition"), "{err}");
    }

    #[test]
    fn test_refund_rules() {
        let mut app = created();
        let refund = |sender: &str| app_call(sender, vec![METHOD_REFUND.to_vec(), b"INV-1".to_vec()]);

        let err = call(&mut app, &[refund(ALICE)], 2_000).unwrap_err();
        assert!(err.contains(reject::NOT_PAID));

        let pay = app_call(CAROL, vec![METHOD_PAY.to_vec(), b"INV-1".to_vec()]);
        call(&mut app, &[pay, payment(CAROL, BOB, 50)], 1_000).unwrap();

        let err = call(&mut app, &[refund(BOB)], 2_000).unwrap_err();
        assert!(err.contains(reject::NOT_CREATOR));
        let err = call(&mut app, &[refund(ALICE)], 1_000).unwrap_err();
        assert!(err.contains(reject::INNER_FEE));

        let effects = call(&mut app, &[refund(ALICE)], 2_000).unwrap();
        assert_eq!(
            effects.inner_payments,
            vec![InnerPayment {
                sender: application_address(7),
                receiver: CAROL.into(),
                amount: 50,
            }]
        );
        let err = call(&mut app, &[refund(ALICE)], 2_000).unwrap_err();
        assert!(err.contains(reject::ALREADY_REFUNDED));
    }

    #[test]
    fn test_schema_is_enforced() {
        let mut app = Application::create(8, ALICE, 1 + INTS_PER_INVOICE, 1 + BYTES_PER_INVOICE).unwrap();
        call(&mut app, &[app_call(ALICE, create_args("A", 1, 500, BOB))], 1_000).unwrap();
        let err = call(&mut app, &[app_call(ALICE, create_args("B", 1, 500, BOB))], 1_000).unwrap_err();
        assert!(err.contains("exceeds schema"));
        assert!(Application::create(9, ALICE, 40, 40).is_err());
    }

    #[test]
    fn test_long_invoice_id_rejected() {
        let mut app = app();
        let id = "X".repeat(60);
        let err = call(&mut app, &[app_call(ALICE, create_args(&id, 1, 500, BOB))], 1_000).unwrap_err();
        assert!(err.contains("key too long"));
    }
}
