//! Native balances and ERC20 token ledgers.

use std::collections::HashMap;

/// Balances of the native currency and every deployed ERC20 token.
#[derive(Debug, Clone, Default)]
pub(crate) struct Assets {
    native: HashMap<String, u128>,
    tokens: HashMap<String, Erc20>,
}

impl Assets {
    pub fn native_balance(&self, address: &str) -> u128 {
        self.native.get(address).copied().unwrap_or(0)
    }

    pub fn credit_native(&mut self, address: &str, amount: u128) {
        let balance = self.native.entry(address.to_string()).or_insert(0);
        *balance = balance.saturating_add(amount);
    }

    pub fn transfer_native(&mut self, from: &str, to: &str, amount: u128) -> Result<(), String> {
        if amount == 0 {
            return Ok(());
        }
        let balance = self.native_balance(from);
        if balance < amount {
            return Err(format!(
                "insufficient funds: balance {} below {}",
                balance, amount
            ));
        }
        self.native.insert(from.to_string(), balance - amount);
        self.credit_native(to, amount);
        Ok(())
    }

    pub fn add_token(&mut self, address: &str, token: Erc20) {
        self.tokens.insert(address.to_string(), token);
    }

    pub fn is_token(&self, address: &str) -> bool {
        self.tokens.contains_key(address)
    }

    pub fn token(&self, address: &str) -> Option<&Erc20> {
        self.tokens.get(address)
    }

    pub fn token_mut(&mut self, address: &str) -> Result<&mut Erc20, String> {
        self.tokens
            .get_mut(address)
            .ok_or_else(|| format!("no token contract at {}", address))
    }
}

/// Minimal ERC20: balances, allowances, transfer and transferFrom.
#[derive(Debug, Clone)]
pub(crate) struct Erc20 {
    pub symbol: String,
    pub decimals: u8,
    balances: HashMap<String, u128>,
    allowances: HashMap<(String, String), u128>,
}

impl Erc20 {
    pub fn new(symbol: &str, decimals: u8) -> Self {
        Self {
            symbol: symbol.to_string(),
            decimals,
            balances: HashMap::new(),
            allowances: HashMap::new(),
        }
    }

    pub fn balance_of(&self, owner: &str) -> u128 {
        self.balances.get(owner).copied().unwrap_or(0)
    }

    pub fn allowance(&self, owner: &str, spender: &str) -> u128 {
        self.allowances
            .get(&(owner.to_string(), spender.to_string()))
            .copied()
            .unwrap_or(0)
    }

    pub fn mint(&mut self, to: &str, amount: u128) {
        let balance = self.balances.entry(to.to_string()).or_insert(0);
        *balance = balance.saturating_add(amount);
    }

    pub fn approve(&mut self, owner: &str, spender: &str, amount: u128) {
        self.allowances
            .insert((owner.to_string(), spender.to_string()), amount);
    }

    pub fn transfer(&mut self, from: &str, to: &str, amount: u128) -> Result<(), String> {
        let balance = self.balance_of(from);
        if balance < amount {
            return Err("ERC20: transfer amount exceeds balance".into());
        }
        self.balances.insert(from.to_string(), balance - amount);
        self.mint(to, amount);
        Ok(())
    }

    pub fn transfer_from(
        &mut self,
        spender: &str,
        from: &str,
        to: &str,
        amount: u128,
    ) -> Result<(), String> {
        let allowance = self.allowance(from, spender);
        if allowance < amount {
            return Err("ERC20: insufficient allowance".into());
        }
        self.transfer(from, to, amount)?;
        self.approve(from, spender, allowance - amount);
        Ok(())
    }
}
