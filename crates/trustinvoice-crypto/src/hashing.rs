/// BLAKE3 hash (32 bytes).
pub type Hash = [u8; 32];

/// Hash arbitrary data using BLAKE3.
pub fn hash(data: &[u8]) -> Hash {
    *blake3::hash(data).as_bytes()
}

/// Registry key of an EVM invoice: `0x`-prefixed hex of
/// `BLAKE3(invoice_id ‖ recipient ‖ amount ‖ due_date ‖ salt)`.
///
/// Variable-length fields are length-prefixed so distinct inputs cannot collide
/// by shifting bytes between neighbours.
pub fn invoice_hash(
    invoice_id: &str,
    recipient: &str,
    amount: u128,
    due_date: u64,
    salt: &[u8],
) -> String {
    let mut hasher = blake3::Hasher::new();
    for field in [invoice_id.as_bytes(), recipient.as_bytes()] {
        hasher.update(&(field.len() as u64).to_be_bytes());
        hasher.update(field);
    }
    hasher.update(&amount.to_be_bytes());
    hasher.update(&due_date.to_be_bytes());
    hasher.update(&(salt.len() as u64).to_be_bytes());
    hasher.update(salt);
    format!("0x{}", hex::encode(hasher.finalize().as_bytes()))
}

/// EVM transaction hash of a signed transaction.
pub fn evm_tx_hash(signed: &[u8]) -> String {
    format!("0x{}", hex::encode(hash(signed)))
}

/// Algorand transaction id of an unsigned transaction payload.
///
/// Computed over the payload only, so the id is known before signing and
/// can be used to derive the group id.
pub fn algorand_tx_id(payload: &[u8]) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"TX");
    hasher.update(payload);
    hex::encode_upper(hasher.finalize().as_bytes())
}

/// Group id shared by all transactions of an atomic group.
pub fn group_id<S: AsRef<str>>(tx_ids: &[S]) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"TG");
    for id in tx_ids {
        hasher.update(id.as_ref().as_bytes());
    }
    hex::encode(hasher.finalize().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_deterministic() {
        assert_eq!(hash(b"invoice"), hash(b"invoice"));
        assert_ne!(hash(b"invoice"), hash(b"invoicf"));
    }

    #[test]
    fn test_invoice_hash_depends_on_every_field() {
        let base = invoice_hash("INV-1", "0xabc", 100, 1_000, b"salt");
        assert!(base.starts_with("0x"));
        assert_eq!(base.len(), 66);
        assert_ne!(base, invoice_hash("INV-2", "0xabc", 100, 1_000, b"salt"));
        assert_ne!(base, invoice_hash("INV-1", "0xabd", 100, 1_000, b"salt"));
        assert_ne!(base, invoice_hash("INV-1", "0xabc", 101, 1_000, b"salt"));
        assert_ne!(base, invoice_hash("INV-1", "0xabc", 100, 1_001, b"salt"));
        assert_ne!(base, invoice_hash("INV-1", "0xabc", 100, 1_000, b"pepper"));
    }

    #[test]
    fn test_invoice_hash_length_prefixing() {
        assert_ne!(
            invoice_hash("ab", "c", 1, 1, b""),
            invoice_hash("a", "bc", 1, 1, b"")
        );
    }

    #[test]
    fn test_group_id_order_sensitive() {
        assert_ne!(group_id(&["A", "B"]), group_id(&["B", "A"]));
        assert_eq!(group_id(&["A", "B"]), group_id(&["A".to_string(), "B".to_string()]));
    }

    #[test]
    fn test_tx_id_formats() {
        assert!(evm_tx_hash(b"raw").starts_with("0x"));
        let id = algorand_tx_id(b"payload");
        assert_eq!(id.len(), 64);
        assert_eq!(id, id.to_uppercase());
    }
}
