//! The invoice registry contract: one shared contract per EVM network
//! holding every invoice keyed by its hash.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use trustinvoice_core::{FeeCalculator, InvoiceEvent, InvoiceStateMachine, InvoiceStatus};

use super::assets::Assets;
use super::{EvmCall, RegistryEvent};

/// Revert reasons the registry produces.
pub mod revert {
    pub const PAUSED: &str = "Pausable: paused";
    pub const NOT_PAUSED: &str = "Pausable: not paused";
    pub const NOT_OWNER: &str = "Ownable: caller is not the owner";
    pub const NOT_PAYABLE: &str = "Function does not accept value";
    pub const FEE_TOO_HIGH: &str = "Fee too high";
    pub const INVALID_RECIPIENT: &str = "Invalid recipient";
    pub const ZERO_AMOUNT: &str = "Amount must be greater than 0";
    pub const DUE_DATE_PASSED: &str = "Due date must be in the future";
    pub const TOKEN_NOT_AUTHORIZED: &str = "Token not authorized";
    pub const INVOICE_EXISTS: &str = "Invoice already exists";
    pub const INVOICE_NOT_FOUND: &str = "Invoice does not exist";
    pub const ALREADY_PAID: &str = "Invoice already paid";
    pub const INCORRECT_AMOUNT: &str = "Incorrect payment amount";
    pub const NOT_RECIPIENT: &str = "Only recipient can release escrow";
    pub const NOT_ESCROW: &str = "Invoice is not escrowed";
    pub const NOT_IN_ESCROW: &str = "Invoice not in escrow";
    pub const NOT_REFUNDER: &str = "Only creator or recipient can refund";
    pub const NOT_PAID: &str = "Invoice not paid";
    pub const ALREADY_REFUNDED: &str = "Invoice already refunded";
    pub const ALREADY_RELEASED: &str = "Escrow already released";
    pub const FULL_REFUND_REQUIRED: &str = "Refund must return the full amount";
}

/// Invoice as stored in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryInvoice {
    pub invoice_hash: String,
    pub invoice_id: String,
    pub creator: String,
    pub recipient: String,
    pub amount: u128,
    pub due_date: u64,
    pub description: String,
    pub token_address: Option<String>,
    pub is_escrow: bool,
    pub is_paid: bool,
    pub is_released: bool,
    pub is_refunded: bool,
    pub payer: Option<String>,
    /// Fee rate captured when the payment was accepted.
    pub fee_bps: Option<u16>,
    pub created_at: u64,
}

impl RegistryInvoice {
    pub fn status(&self) -> InvoiceStatus {
        InvoiceStatus::from_flags(self.is_paid, self.is_refunded, self.is_escrow, self.is_released)
    }

    /// Move the stored flags along the invoice state machine.
    fn apply(&mut self, event: InvoiceEvent) -> Result<InvoiceStatus, String> {
        let next = InvoiceStateMachine::transition(self.status(), event).map_err(|e| e.to_string())?;
        match next {
            InvoiceStatus::Paid | InvoiceStatus::EscrowHeld => self.is_paid = true,
            InvoiceStatus::Released => self.is_released = true,
            InvoiceStatus::Refunded => self.is_refunded = true,
            InvoiceStatus::Created => {}
        }
        Ok(next)
    }
}

/// Caller context of a registry call.
pub(crate) struct CallContext<'a> {
    pub sender: &'a str,
    pub value: u128,
    pub now: u64,
}

#[derive(Debug, Clone)]
pub(crate) struct Registry {
    address: String,
    owner: String,
    fee_recipient: String,
    fees: FeeCalculator,
    paused: bool,
    authorized_tokens: HashSet<String>,
    invoices: HashMap<String, RegistryInvoice>,
}

fn require(condition: bool, reason: &str) -> Result<(), String> {
    if condition {
        Ok(())
    } else {
        Err(reason.to_string())
    }
}

impl Registry {
    pub fn deploy(
        address: &str,
        owner: &str,
        fee_recipient: &str,
        fee_bps: u16,
    ) -> Result<Self, String> {
        let fees = FeeCalculator::new(fee_bps).map_err(|_| revert::FEE_TOO_HIGH.to_string())?;
        Ok(Self {
            address: address.to_string(),
            owner: owner.to_string(),
            fee_recipient: fee_recipient.to_string(),
            fees,
            paused: false,
            authorized_tokens: HashSet::new(),
            invoices: HashMap::new(),
        })
    }

    pub fn fee_bps(&self) -> u16 {
        self.fees.fee_bps()
    }

    pub fn invoice(&self, invoice_hash: &str) -> Option<&RegistryInvoice> {
        self.invoices.get(invoice_hash)
    }

    /// `block.timestamp > dueDate && !isPaid`
    pub fn is_overdue(&self, invoice_hash: &str, now: u64) -> Result<bool, String> {
        let invoice = self
            .invoices
            .get(invoice_hash)
            .ok_or_else(|| revert::INVOICE_NOT_FOUND.to_string())?;
        Ok(now > invoice.due_date && !invoice.is_paid)
    }

    /// Dispatch a call. `ctx.value` has already been credited to the registry.
    pub fn execute(
        &mut self,
        assets: &mut Assets,
        ctx: &CallContext<'_>,
        call: &EvmCall,
    ) -> Result<Vec<RegistryEvent>, String> {
        match call {
            EvmCall::CreateInvoice {
                invoice_id,
                recipient,
                amount,
                due_date,
                token_address,
                is_escrow,
                description,
                salt,
            } => {
                require(ctx.value == 0, revert::NOT_PAYABLE)?;
                self.create_invoice(
                    ctx,
                    invoice_id,
                    recipient,
                    *amount,
                    *due_date,
                    token_address.as_deref(),
                    *is_escrow,
                    description,
                    salt,
                )
            }
            EvmCall::PayInvoice { invoice_hash } => self.pay_invoice(assets, ctx, invoice_hash),
            EvmCall::ReleaseEscrow { invoice_hash } => {
                require(ctx.value == 0, revert::NOT_PAYABLE)?;
                self.release_escrow(assets, ctx, invoice_hash)
            }
            EvmCall::RefundInvoice { invoice_hash } => {
                self.refund_invoice(assets, ctx, invoice_hash)
            }
            EvmCall::UpdatePlatformFee { fee_bps } => {
                self.only_owner(ctx)?;
                self.fees
                    .set_fee_bps(*fee_bps)
                    .map_err(|_| revert::FEE_TOO_HIGH.to_string())?;
                Ok(vec![RegistryEvent::PlatformFeeUpdated { fee_bps: *fee_bps }])
            }
            EvmCall::AuthorizeToken { token, authorized } => {
                self.only_owner(ctx)?;
                if *authorized {
                    self.authorized_tokens.insert(token.clone());
                } else {
                    self.authorized_tokens.remove(token);
                }
                Ok(vec![RegistryEvent::TokenAuthorized {
                    token: token.clone(),
                    authorized: *authorized,
                }])
            }
            EvmCall::Pause => {
                self.only_owner(ctx)?;
                require(!self.paused, revert::PAUSED)?;
                self.paused = true;
                Ok(vec![RegistryEvent::Paused {
                    account: ctx.sender.to_string(),
                }])
            }
            EvmCall::Unpause => {
                self.only_owner(ctx)?;
                require(self.paused, revert::NOT_PAUSED)?;
                self.paused = false;
                Ok(vec![RegistryEvent::Unpaused {
                    account: ctx.sender.to_string(),
                }])
            }
            EvmCall::DeployRegistry { .. } | EvmCall::Approve { .. } | EvmCall::Transfer => {
                Err("function selector was not recognized".into())
            }
        }
    }

    fn only_owner(&self, ctx: &CallContext<'_>) -> Result<(), String> {
        require(ctx.value == 0, revert::NOT_PAYABLE)?;
        require(ctx.sender == self.owner, revert::NOT_OWNER)
    }

    #[allow(clippy::too_many_arguments)]
    fn create_invoice(
        &mut self,
        ctx: &CallContext<'_>,
        invoice_id: &str,
        recipient: &str,
        amount: u128,
        due_date: u64,
        token_address: Option<&str>,
        is_escrow: bool,
        description: &str,
        salt: &str,
    ) -> Result<Vec<RegistryEvent>, String> {
        require(!self.paused, revert::PAUSED)?;
        require(!recipient.is_empty(), revert::INVALID_RECIPIENT)?;
        require(amount > 0, revert::ZERO_AMOUNT)?;
        require(due_date > ctx.now, revert::DUE_DATE_PASSED)?;
        if let Some(token) = token_address {
            require(self.authorized_tokens.contains(token), revert::TOKEN_NOT_AUTHORIZED)?;
        }

        let salt = hex::decode(salt).map_err(|_| "Invalid salt".to_string())?;
        let invoice_hash =
            trustinvoice_crypto::invoice_hash(invoice_id, recipient, amount, due_date, &salt);
        require(!self.invoices.contains_key(&invoice_hash), revert::INVOICE_EXISTS)?;

        let invoice = RegistryInvoice {
            invoice_hash: invoice_hash.clone(),
            invoice_id: invoice_id.to_string(),
            creator: ctx.sender.to_string(),
            recipient: recipient.to_string(),
            amount,
            due_date,
            description: description.to_string(),
            token_address: token_address.map(str::to_string),
            is_escrow,
            is_paid: false,
            is_released: false,
            is_refunded: false,
            payer: None,
            fee_bps: None,
            created_at: ctx.now,
        };
        self.invoices.insert(invoice_hash.clone(), invoice);

        Ok(vec![RegistryEvent::InvoiceCreated {
            invoice_hash,
            invoice_id: invoice_id.to_string(),
            creator: ctx.sender.to_string(),
            recipient: recipient.to_string(),
            amount,
            due_date,
            token_address: token_address.map(str::to_string),
            is_escrow,
        }])
    }

    fn pay_invoice(
        &mut self,
        assets: &mut Assets,
        ctx: &CallContext<'_>,
        invoice_hash: &str,
    ) -> Result<Vec<RegistryEvent>, String> {
        require(!self.paused, revert::PAUSED)?;
        let fees = self.fees;
        let invoice = self.invoice_mut(invoice_hash)?;
        require(!invoice.is_paid, revert::ALREADY_PAID)?;
        let amount = invoice.amount;
        let is_escrow = invoice.is_escrow;
        let recipient = invoice.recipient.clone();
        let token = invoice.token_address.clone();

        match token.as_deref() {
            None => require(ctx.value == amount, revert::INCORRECT_AMOUNT)?,
            Some(token) => {
                require(ctx.value == 0, revert::INCORRECT_AMOUNT)?;
                assets
                    .token_mut(token)?
                    .transfer_from(&self.address, ctx.sender, &self.address, amount)?;
            }
        }

        let event = if is_escrow {
            InvoiceEvent::PaymentEscrowed
        } else {
            InvoiceEvent::PaymentSettled
        };
        let invoice = self.invoice_mut(invoice_hash)?;
        invoice.apply(event)?;
        invoice.payer = Some(ctx.sender.to_string());
        invoice.fee_bps = Some(fees.fee_bps());

        let charged = if is_escrow {
            0
        } else {
            let split = fees.split(amount);
            self.disburse(assets, token.as_deref(), &recipient, split.net)?;
            let fee_recipient = self.fee_recipient.clone();
            self.disburse(assets, token.as_deref(), &fee_recipient, split.fee)?;
            split.fee
        };

        Ok(vec![RegistryEvent::InvoicePaid {
            invoice_hash: invoice_hash.to_string(),
            payer: ctx.sender.to_string(),
            amount,
            fee: charged,
        }])
    }

    fn release_escrow(
        &mut self,
        assets: &mut Assets,
        ctx: &CallContext<'_>,
        invoice_hash: &str,
    ) -> Result<Vec<RegistryEvent>, String> {
        let invoice = self.invoice_mut(invoice_hash)?;
        require(ctx.sender == invoice.recipient, revert::NOT_RECIPIENT)?;
        require(invoice.is_escrow, revert::NOT_ESCROW)?;
        require(
            invoice.is_paid && !invoice.is_released && !invoice.is_refunded,
            revert::NOT_IN_ESCROW,
        )?;

        invoice.apply(InvoiceEvent::EscrowReleased)?;
        let amount = invoice.amount;
        let split = FeeCalculator::new(invoice.fee_bps.unwrap_or(0))
            .map_err(|_| revert::FEE_TOO_HIGH.to_string())?
            .split(amount);
        let charged = split.fee;
        let recipient = invoice.recipient.clone();
        let token = invoice.token_address.clone();

        self.disburse(assets, token.as_deref(), &recipient, split.net)?;
        let fee_recipient = self.fee_recipient.clone();
        self.disburse(assets, token.as_deref(), &fee_recipient, charged)?;

        Ok(vec![RegistryEvent::EscrowReleased {
            invoice_hash: invoice_hash.to_string(),
            recipient,
            amount,
            fee: charged,
        }])
    }

    fn refund_invoice(
        &mut self,
        assets: &mut Assets,
        ctx: &CallContext<'_>,
        invoice_hash: &str,
    ) -> Result<Vec<RegistryEvent>, String> {
        let registry = self.address.clone();
        let invoice = self.invoice_mut(invoice_hash)?;
        require(
            ctx.sender == invoice.creator || ctx.sender == invoice.recipient,
            revert::NOT_REFUNDER,
        )?;
        require(invoice.is_paid, revert::NOT_PAID)?;
        require(!invoice.is_refunded, revert::ALREADY_REFUNDED)?;
        require(!invoice.is_released, revert::ALREADY_RELEASED)?;

        let amount = invoice.amount;
        let is_escrow = invoice.is_escrow;
        let token = invoice.token_address.clone();
        let payer = invoice
            .payer
            .clone()
            .ok_or_else(|| revert::NOT_PAID.to_string())?;

        // Forwarded native payments are returned by the refunder in full.
        if !is_escrow && token.is_none() {
            require(ctx.value == amount, revert::FULL_REFUND_REQUIRED)?;
        } else {
            require(ctx.value == 0, revert::NOT_PAYABLE)?;
        }
        invoice.apply(InvoiceEvent::Refunded)?;

        match (is_escrow, token.as_deref()) {
            (true, token) => self.disburse(assets, token, &payer, amount)?,
            (false, None) => assets.transfer_native(&registry, &payer, amount)?,
            (false, Some(token)) => assets
                .token_mut(token)?
                .transfer_from(&registry, ctx.sender, &payer, amount)?,
        }

        Ok(vec![RegistryEvent::InvoiceRefunded {
            invoice_hash: invoice_hash.to_string(),
            payer,
            amount,
        }])
    }

    fn invoice_mut(&mut self, invoice_hash: &str) -> Result<&mut RegistryInvoice, String> {
        self.invoices
            .get_mut(invoice_hash)
            .ok_or_else(|| revert::INVOICE_NOT_FOUND.to_string())
    }

    /// Pay out of the registry's own holdings.
    fn disburse(
        &self,
        assets: &mut Assets,
        token: Option<&str>,
        to: &str,
        amount: u128,
    ) -> Result<(), String> {
        if amount == 0 {
            return Ok(());
        }
        match token {
            None => assets.transfer_native(&self.address, to, amount),
            Some(token) => assets.token_mut(token)?.transfer(&self.address, to, amount),
        }
    }
}
