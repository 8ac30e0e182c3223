//! Integration test: invoice lifecycle on an EVM chain through the engine.
//!
//! Payment, platform fee, escrow, refund and overdue behaviour as seen by
//! the engine, checked against the ledger's balances.

use trustinvoice_core::{Blockchain, InvoiceStatus};
use trustinvoice_integration_tests::{harness, Harness, DUE_DATE, ETHER, FEE_BPS, GENESIS_TIME};
use trustinvoice_settlement::ledger::EvmRpc;
use trustinvoice_settlement::{LocalSigner, SettlementError};

// =========================================================================
// Direct payment
// =========================================================================

#[tokio::test]
async fn test_single_payment_then_replay_rejected() {
    let h = harness(Blockchain::Ethereum).await;
    let invoice = h
        .engine
        .create_invoice(&h.params(Blockchain::Ethereum, "INV-1", 10 * ETHER, false), &h.alice)
        .await
        .expect("create should succeed");
    assert_eq!(invoice.status, InvoiceStatus::Created);
    let reference = invoice.reference();

    h.engine
        .pay_invoice(&reference, &h.bob)
        .await
        .expect("first payment should succeed");

    let replay = h.engine.pay_invoice(&reference, &h.carol).await;
    assert!(matches!(replay, Err(SettlementError::AlreadyPaid(_))));

    let details = h.engine.get_invoice_details(&reference).await.unwrap();
    assert_eq!(details.status, InvoiceStatus::Paid);
    assert_eq!(details.payer, Some(h.bob.evm_address()));
    assert_eq!(
        h.ethereum.balance(&h.carol.evm_address()).await.unwrap(),
        1_000 * ETHER
    );
}

#[tokio::test]
async fn test_hundred_ether_pays_ninety_seven_and_a_half() {
    let h = harness(Blockchain::Ethereum).await;
    let invoice = h
        .engine
        .create_invoice(&h.params(Blockchain::Ethereum, "INV-FEE", 100 * ETHER, false), &h.alice)
        .await
        .unwrap();

    let alice_before = h.ethereum.balance(&h.alice.evm_address()).await.unwrap();
    let owner_before = h.ethereum.balance(&h.owner.evm_address()).await.unwrap();
    let bob_before = h.ethereum.balance(&h.bob.evm_address()).await.unwrap();

    h.engine.pay_invoice(&invoice.reference(), &h.bob).await.unwrap();

    let alice_gain = h.ethereum.balance(&h.alice.evm_address()).await.unwrap() - alice_before;
    let owner_gain = h.ethereum.balance(&h.owner.evm_address()).await.unwrap() - owner_before;
    let bob_spent = bob_before - h.ethereum.balance(&h.bob.evm_address()).await.unwrap();

    assert_eq!(alice_gain, 97 * ETHER + ETHER / 2);
    assert_eq!(owner_gain, 2 * ETHER + ETHER / 2);
    assert_eq!(bob_spent, 100 * ETHER);

    let details = h.engine.get_invoice_details(&invoice.reference()).await.unwrap();
    assert_eq!(details.fee_bps, Some(FEE_BPS));
}

#[tokio::test]
async fn test_fee_and_net_always_sum_to_amount() {
    let h = harness(Blockchain::Polygon).await;
    for (i, amount) in [1u128, 39, 40, 999, 12_345_678_901, 3 * ETHER + 7].into_iter().enumerate() {
        let id = format!("INV-SUM-{}", i);
        let invoice = h
            .engine
            .create_invoice(&h.params(Blockchain::Polygon, &id, amount, false), &h.alice)
            .await
            .unwrap();

        let alice_before = h.polygon.balance(&h.alice.evm_address()).await.unwrap();
        let owner_before = h.polygon.balance(&h.owner.evm_address()).await.unwrap();
        h.engine.pay_invoice(&invoice.reference(), &h.bob).await.unwrap();
        let net = h.polygon.balance(&h.alice.evm_address()).await.unwrap() - alice_before;
        let fee = h.polygon.balance(&h.owner.evm_address()).await.unwrap() - owner_before;

        assert_eq!(net + fee, amount, "amount {}", amount);
        assert_eq!(fee, amount * FEE_BPS as u128 / 10_000, "amount {}", amount);
    }
}

// =========================================================================
// Escrow
// =========================================================================

#[tokio::test]
async fn test_escrow_held_until_recipient_releases() {
    let h = harness(Blockchain::Ethereum).await;
    let invoice = h
        .engine
        .create_invoice(&h.params(Blockchain::Ethereum, "INV-ESC", 40 * ETHER, true), &h.alice)
        .await
        .unwrap();
    let reference = invoice.reference();
    let alice_before = h.ethereum.balance(&h.alice.evm_address()).await.unwrap();

    h.engine.pay_invoice(&reference, &h.bob).await.unwrap();
    let held = h.engine.get_invoice_details(&reference).await.unwrap();
    assert_eq!(held.status, InvoiceStatus::EscrowHeld);
    assert_eq!(
        h.ethereum.balance(&h.alice.evm_address()).await.unwrap(),
        alice_before,
        "escrowed funds must not reach the recipient before release"
    );

    let stranger = h.engine.release_escrow(&reference, &h.carol).await;
    assert!(matches!(stranger, Err(SettlementError::Unauthorized(_))));

    h.engine.release_escrow(&reference, &h.alice).await.unwrap();
    let released = h.engine.get_invoice_details(&reference).await.unwrap();
    assert_eq!(released.status, InvoiceStatus::Released);
    assert_eq!(
        h.ethereum.balance(&h.alice.evm_address()).await.unwrap() - alice_before,
        39 * ETHER
    );

    let again = h.engine.release_escrow(&reference, &h.alice).await;
    assert!(matches!(again, Err(SettlementError::NotEscrowed(_))));
}

#[tokio::test]
async fn test_release_of_direct_invoice_rejected() {
    let h = harness(Blockchain::Ethereum).await;
    let invoice = h
        .engine
        .create_invoice(&h.params(Blockchain::Ethereum, "INV-DIRECT", ETHER, false), &h.alice)
        .await
        .unwrap();
    h.engine.pay_invoice(&invoice.reference(), &h.bob).await.unwrap();

    let result = h.engine.release_escrow(&invoice.reference(), &h.alice).await;
    assert!(matches!(result, Err(SettlementError::NotEscrowed(_))));
}

// =========================================================================
// Refund
// =========================================================================

#[tokio::test]
async fn test_refund_returns_full_amount_to_payer() {
    let h = harness(Blockchain::Ethereum).await;
    for (id, is_escrow) in [("INV-RF-DIRECT", false), ("INV-RF-ESCROW", true)] {
        let invoice = h
            .engine
            .create_invoice(&h.params(Blockchain::Ethereum, id, 25 * ETHER, is_escrow), &h.alice)
            .await
            .unwrap();
        let reference = invoice.reference();
        let bob_before = h.ethereum.balance(&h.bob.evm_address()).await.unwrap();

        h.engine.pay_invoice(&reference, &h.bob).await.unwrap();
        let denied = h.engine.refund_invoice(&reference, &h.carol).await;
        assert!(matches!(denied, Err(SettlementError::Unauthorized(_))), "{id}");

        h.engine.refund_invoice(&reference, &h.alice).await.unwrap();
        assert_eq!(
            h.ethereum.balance(&h.bob.evm_address()).await.unwrap(),
            bob_before,
            "{id}: payer must be made whole"
        );
        let details = h.engine.get_invoice_details(&reference).await.unwrap();
        assert_eq!(details.status, InvoiceStatus::Refunded, "{id}");

        let twice = h.engine.refund_invoice(&reference, &h.alice).await;
        assert!(matches!(twice, Err(SettlementError::NotEscrowed(_))), "{id}");
    }
}

async fn token_balance(h: &Harness, token: &str, holder: &LocalSigner) -> u128 {
    h.ethereum.token_balance(token, &holder.evm_address()).await.unwrap()
}

#[tokio::test]
async fn test_token_refund_returns_tokens_from_refunder() {
    const USDC: u128 = 1_000_000;

    let h = harness(Blockchain::Ethereum).await;
    let usdc = h.ethereum.deploy_token("USDC", 6);
    h.ethereum.mint(&usdc, &h.bob.evm_address(), 1_000 * USDC).unwrap();
    h.ethereum.mint(&usdc, &h.alice.evm_address(), 10 * USDC).unwrap();
    h.ethereum_adapter.authorize_token(&h.owner, &usdc, true).await.unwrap();

    let mut params = h.params(Blockchain::Ethereum, "INV-USDC-RF", 100 * USDC, false);
    params.token_address = Some(usdc.clone());
    let invoice = h.engine.create_invoice(&params, &h.alice).await.unwrap();
    let reference = invoice.reference();

    h.engine.pay_invoice(&reference, &h.bob).await.unwrap();
    assert_eq!(token_balance(&h, &usdc, &h.bob).await, 900 * USDC);
    assert_eq!(token_balance(&h, &usdc, &h.alice).await, 107 * USDC + USDC / 2);
    assert_eq!(token_balance(&h, &usdc, &h.owner).await, 2 * USDC + USDC / 2);

    // Alice holds 107.5 USDC, enough to return the full 100 even though she
    // only received the net amount.
    h.engine.refund_invoice(&reference, &h.alice).await.unwrap();
    assert_eq!(token_balance(&h, &usdc, &h.bob).await, 1_000 * USDC);
    assert_eq!(token_balance(&h, &usdc, &h.alice).await, 7 * USDC + USDC / 2);
    assert_eq!(token_balance(&h, &usdc, &h.owner).await, 2 * USDC + USDC / 2);

    let details = h.engine.get_invoice_details(&reference).await.unwrap();
    assert_eq!(details.status, InvoiceStatus::Refunded);
    assert_eq!(details.token_address, Some(usdc));
}

#[tokio::test]
async fn test_unpaid_invoice_cannot_be_refunded() {
    let h = harness(Blockchain::Ethereum).await;
    let invoice = h
        .engine
        .create_invoice(&h.params(Blockchain::Ethereum, "INV-UNPAID", ETHER, false), &h.alice)
        .await
        .unwrap();
    let result = h.engine.refund_invoice(&invoice.reference(), &h.alice).await;
    assert!(matches!(result, Err(SettlementError::NotEscrowed(_))));
}

// =========================================================================
// Due dates
// =========================================================================

#[tokio::test]
async fn test_past_due_date_rejected_before_submission() {
    let h = harness(Blockchain::Ethereum).await;
    let mut params = h.params(Blockchain::Ethereum, "INV-LATE", ETHER, false);
    params.due_date = GENESIS_TIME;

    let result = h.engine.create_invoice(&params, &h.alice).await;
    assert!(matches!(result, Err(SettlementError::Validation(_))));
    assert_eq!(h.engine.cached_invoices(), 0);
    assert_eq!(h.ethereum.transaction_count(&h.alice.evm_address()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_overdue_is_monotonic_until_paid() {
    let h = harness(Blockchain::Ethereum).await;
    let unpaid = h
        .engine
        .create_invoice(&h.params(Blockchain::Ethereum, "INV-OD-1", ETHER, false), &h.alice)
        .await
        .unwrap()
        .reference();
    let paid = h
        .engine
        .create_invoice(&h.params(Blockchain::Ethereum, "INV-OD-2", ETHER, false), &h.alice)
        .await
        .unwrap()
        .reference();
    h.engine.pay_invoice(&paid, &h.bob).await.unwrap();

    assert!(!h.engine.is_overdue(&unpaid).await.unwrap());
    h.clock.set(DUE_DATE);
    assert!(!h.engine.is_overdue(&unpaid).await.unwrap(), "due date itself is not overdue");

    for step in [1, 60, 86_400, 30 * 86_400] {
        h.clock.set(DUE_DATE + step);
        assert!(h.engine.is_overdue(&unpaid).await.unwrap(), "step {step}");
        assert!(!h.engine.is_overdue(&paid).await.unwrap(), "step {step}");
    }

    h.engine.pay_invoice(&unpaid, &h.bob).await.unwrap();
    assert!(!h.engine.is_overdue(&unpaid).await.unwrap());
}
