//! Integration test: concurrent callers and unconfirmed transactions.

use std::sync::Arc;

use trustinvoice_core::{Blockchain, InvoiceStatus};
use trustinvoice_integration_tests::{harness, ALGO, ETHER};
use trustinvoice_settlement::ledger::{AlgodClient, EvmRpc};
use trustinvoice_settlement::{LocalSigner, SettlementError};

#[tokio::test]
async fn test_concurrent_double_payment_settles_once() {
    let h = harness(Blockchain::Ethereum).await;
    let invoice = h
        .engine
        .create_invoice(&h.params(Blockchain::Ethereum, "INV-RACE", 10 * ETHER, false), &h.alice)
        .await
        .unwrap();
    let reference = invoice.reference();
    let alice_before = h.ethereum.balance(&h.alice.evm_address()).await.unwrap();

    let mut handles = Vec::new();
    for seed in [[0xB0u8; 32], [0xC0u8; 32]] {
        let engine = Arc::clone(&h.engine);
        let reference = reference.clone();
        handles.push(tokio::spawn(async move {
            let payer = LocalSigner::from_seed(&seed);
            engine.pay_invoice(&reference, &payer).await
        }));
    }

    let mut paid = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.expect("payment task panicked") {
            Ok(_) => paid += 1,
            Err(SettlementError::AlreadyPaid(_)) => rejected += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!((paid, rejected), (1, 1));

    let net = h.ethereum.balance(&h.alice.evm_address()).await.unwrap() - alice_before;
    assert_eq!(net, 10 * ETHER - ETHER / 4, "recipient credited exactly once");
    let details = h.engine.get_invoice_details(&reference).await.unwrap();
    assert_eq!(details.status, InvoiceStatus::Paid);
}

#[tokio::test]
async fn test_unconfirmed_evm_payment_times_out_without_resubmission() {
    let h = harness(Blockchain::Polygon).await;
    let invoice = h
        .engine
        .create_invoice(&h.params(Blockchain::Polygon, "INV-SLOW", ETHER, false), &h.alice)
        .await
        .unwrap();
    let reference = invoice.reference();

    h.polygon.set_automine(false);
    h.polygon.set_interval_mining(false);
    let result = h.engine.pay_invoice(&reference, &h.bob).await;
    match result {
        Err(SettlementError::Timeout { attempts, .. }) => assert_eq!(attempts, 30),
        other => panic!("expected a timeout, got {:?}", other),
    }
    assert_eq!(h.polygon.pending_count(), 1, "the payment is submitted exactly once");

    h.polygon.mine();
    let details = h.engine.get_invoice_details(&reference).await.unwrap();
    assert_eq!(details.status, InvoiceStatus::Paid);
    assert_eq!(h.polygon.pending_count(), 0);
}

#[tokio::test]
async fn test_unconfirmed_algorand_payment_times_out_without_resubmission() {
    let h = harness(Blockchain::Algorand).await;
    let invoice = h
        .engine
        .create_invoice(
            &h.params(Blockchain::Algorand, "INV-POOL", 20 * ALGO as u128, false),
            &h.alice,
        )
        .await
        .unwrap();
    let reference = invoice.reference();
    let alice_before = h.algorand.account_balance(&h.alice.algorand_address()).await.unwrap();

    h.algorand.set_auto_commit(false);
    let result = h.engine.pay_invoice(&reference, &h.bob).await;
    assert!(
        matches!(result, Err(SettlementError::Timeout { attempts: 4, .. })),
        "{:?}",
        result
    );
    assert_eq!(h.algorand.pending_count(), 1);
    assert_eq!(
        h.algorand.account_balance(&h.alice.algorand_address()).await.unwrap(),
        alice_before
    );
    let pending = h.engine.get_invoice_details(&reference).await.unwrap();
    assert_eq!(pending.status, InvoiceStatus::Created);

    h.algorand.commit_pending();
    let details = h.engine.get_invoice_details(&reference).await.unwrap();
    assert_eq!(details.status, InvoiceStatus::Paid);
    assert_eq!(
        h.algorand.account_balance(&h.alice.algorand_address()).await.unwrap() - alice_before,
        20 * ALGO
    );

    let again = h.engine.pay_invoice(&reference, &h.carol).await;
    assert!(matches!(again, Err(SettlementError::AlreadyPaid(_))));
    assert_eq!(h.algorand.pending_count(), 0);
}
