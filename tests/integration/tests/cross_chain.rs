//! Integration test: one engine over Ethereum, Polygon and Algorand.
//!
//! The same lifecycle must look the same through the unified invoice view
//! regardless of which chain settled it, and Algorand's grouped payment must
//! be enforced by the ledger, not just by the adapter.

use trustinvoice_core::{Blockchain, InvoiceStatus};
use trustinvoice_integration_tests::{harness, ALGO, ETHER};
use trustinvoice_settlement::ledger::algorand::{assign_group_id, TxnKind, MIN_TXN_FEE};
use trustinvoice_settlement::ledger::AlgodClient;
use trustinvoice_settlement::{ChainAdapter, Clock, SettlementError, Signer};

fn unit(blockchain: Blockchain) -> u128 {
    match blockchain {
        Blockchain::Algorand => ALGO as u128,
        _ => ETHER,
    }
}

#[tokio::test]
async fn test_lifecycle_parity_across_chains() {
    let h = harness(Blockchain::Ethereum).await;

    for blockchain in Blockchain::ALL {
        h.engine.switch_chain(blockchain).unwrap();
        assert_eq!(h.engine.current_blockchain(), blockchain);

        let amount = 5 * unit(blockchain);
        let created = h
            .engine
            .create_invoice(&h.params(blockchain, "INV-PARITY", amount, false), &h.alice)
            .await
            .unwrap_or_else(|e| panic!("{blockchain}: create failed: {e}"));
        assert_eq!(created.status, InvoiceStatus::Created, "{blockchain}");
        assert_eq!(created.payer, None, "{blockchain}");

        let reference = created.reference();
        let tx_id = h.engine.pay_invoice(&reference, &h.bob).await.unwrap();

        let details = h.engine.get_invoice_details(&reference).await.unwrap();
        let family = blockchain.family();
        assert_eq!(details.id, "INV-PARITY", "{blockchain}");
        assert_eq!(details.blockchain, blockchain);
        assert_eq!(details.amount, amount, "{blockchain}");
        assert_eq!(details.status, InvoiceStatus::Paid, "{blockchain}");
        assert!(
            details.recipient.eq_ignore_ascii_case(&h.alice.address(family)),
            "{blockchain}"
        );
        assert!(
            details.creator.eq_ignore_ascii_case(&h.alice.address(family)),
            "{blockchain}"
        );
        assert!(
            details
                .payer
                .as_deref()
                .is_some_and(|payer| payer.eq_ignore_ascii_case(&h.bob.address(family))),
            "{blockchain}"
        );
        assert_eq!(details.tx_ids.len(), 2, "{blockchain}: create + pay");
        assert_eq!(details.tx_ids.last(), Some(&tx_id), "{blockchain}");
        assert!(details.explorer_url.ends_with(&tx_id), "{blockchain}");
        assert!(!details.is_overdue(h.clock.now()), "{blockchain}");
    }

    assert_eq!(h.engine.cached_invoices(), 3);
}

#[tokio::test]
async fn test_mutations_follow_active_chain_reads_do_not() {
    let h = harness(Blockchain::Ethereum).await;
    let invoice = h
        .engine
        .create_invoice(&h.params(Blockchain::Ethereum, "INV-ACTIVE", ETHER, false), &h.alice)
        .await
        .unwrap();

    h.engine.switch_chain(Blockchain::Algorand).unwrap();
    let pay = h.engine.pay_invoice(&invoice.reference(), &h.bob).await;
    assert!(matches!(pay, Err(SettlementError::Validation(_))));

    let details = h.engine.get_invoice_details(&invoice.reference()).await.unwrap();
    assert_eq!(details.status, InvoiceStatus::Created);
    assert!(!h.engine.is_overdue(&invoice.reference()).await.unwrap());

    h.engine.switch_chain(Blockchain::Ethereum).unwrap();
    h.engine.pay_invoice(&invoice.reference(), &h.bob).await.unwrap();
}

#[tokio::test]
async fn test_algorand_grouped_payment_moves_exact_amount() {
    let h = harness(Blockchain::Algorand).await;
    let invoice = h
        .engine
        .create_invoice(
            &h.params(Blockchain::Algorand, "INV-ALGO-50", 50 * ALGO as u128, false),
            &h.alice,
        )
        .await
        .unwrap();

    let alice_before = h.algorand.account_balance(&h.alice.algorand_address()).await.unwrap();
    let bob_before = h.algorand.account_balance(&h.bob.algorand_address()).await.unwrap();

    h.engine.pay_invoice(&invoice.reference(), &h.bob).await.unwrap();

    let alice_after = h.algorand.account_balance(&h.alice.algorand_address()).await.unwrap();
    let bob_after = h.algorand.account_balance(&h.bob.algorand_address()).await.unwrap();
    assert_eq!(alice_after - alice_before, 50 * ALGO);
    assert!(bob_before - bob_after > 50 * ALGO, "payer also covers the group's fees");

    let details = h.engine.get_invoice_details(&invoice.reference()).await.unwrap();
    assert_eq!(details.status, InvoiceStatus::Paid);
    assert_eq!(details.fee_bps, Some(0));
}

#[tokio::test]
async fn test_algorand_payment_to_wrong_receiver_rejected() {
    let h = harness(Blockchain::Algorand).await;
    let invoice = h
        .engine
        .create_invoice(
            &h.params(Blockchain::Algorand, "INV-TAMPER", 10 * ALGO as u128, false),
            &h.alice,
        )
        .await
        .unwrap();
    let reference = invoice.reference();
    let record = h.algorand_adapter.get_invoice_details(&reference).await.unwrap();

    let mut group = h.algorand_adapter.pay_group(&record, &h.bob).await.unwrap();
    match &mut group[1].kind {
        TxnKind::Payment { receiver, .. } => *receiver = h.carol.algorand_address(),
        other => panic!("expected the payment leg, got {:?}", other),
    }
    assign_group_id(&mut group).unwrap();

    let carol_before = h.algorand.account_balance(&h.carol.algorand_address()).await.unwrap();
    let result = h.algorand_adapter.submit_group(&h.bob, group).await;
    assert!(matches!(result, Err(SettlementError::Chain { .. })), "{:?}", result);

    assert_eq!(
        h.algorand.account_balance(&h.carol.algorand_address()).await.unwrap(),
        carol_before
    );
    let details = h.engine.get_invoice_details(&reference).await.unwrap();
    assert_eq!(details.status, InvoiceStatus::Created);

    h.engine.pay_invoice(&reference, &h.bob).await.unwrap();
}

#[tokio::test]
async fn test_algorand_payment_funded_by_another_account_rejected() {
    let h = harness(Blockchain::Algorand).await;
    let invoice = h
        .engine
        .create_invoice(
            &h.params(Blockchain::Algorand, "INV-SPLIT", 10 * ALGO as u128, false),
            &h.alice,
        )
        .await
        .unwrap();
    let reference = invoice.reference();
    let record = h.algorand_adapter.get_invoice_details(&reference).await.unwrap();

    // Bob calls the application while Carol funds the payment leg; each
    // transaction carries its own sender's signature.
    let mut group = h.algorand_adapter.pay_group(&record, &h.bob).await.unwrap();
    group[1].sender = h.carol.algorand_address();
    assign_group_id(&mut group).unwrap();
    let raw = vec![
        h.bob.sign(&group[0].to_payload().unwrap()).unwrap(),
        h.carol.sign(&group[1].to_payload().unwrap()).unwrap(),
    ];

    let carol_before = h.algorand.account_balance(&h.carol.algorand_address()).await.unwrap();
    let result = h.algorand.send_raw_transactions(&raw).await;
    assert!(matches!(result, Err(SettlementError::Chain { .. })), "{:?}", result);
    assert_eq!(
        h.algorand.account_balance(&h.carol.algorand_address()).await.unwrap(),
        carol_before
    );

    let details = h.engine.get_invoice_details(&reference).await.unwrap();
    assert_eq!(details.status, InvoiceStatus::Created);
    assert_eq!(details.payer, None);

    // A refund after a proper payment goes back to whoever funded it.
    h.engine.pay_invoice(&reference, &h.bob).await.unwrap();
    let bob_before = h.algorand.account_balance(&h.bob.algorand_address()).await.unwrap();
    h.engine.refund_invoice(&reference, &h.alice).await.unwrap();
    let bob_after = h.algorand.account_balance(&h.bob.algorand_address()).await.unwrap();
    assert_eq!(bob_after - bob_before, 10 * ALGO);
}

#[tokio::test]
async fn test_algorand_refund_skips_top_up_when_application_holds_funds() {
    let h = harness(Blockchain::Algorand).await;
    let amount = 20 * ALGO;
    let invoice = h
        .engine
        .create_invoice(
            &h.params(Blockchain::Algorand, "INV-HELD", amount as u128, false),
            &h.alice,
        )
        .await
        .unwrap();
    let reference = invoice.reference();
    h.engine.pay_invoice(&reference, &h.bob).await.unwrap();

    let app_id: u64 = invoice.chain_identifier.parse().unwrap();
    let app = h.algorand.application_info(app_id).await.unwrap().expect("application exists");
    h.algorand.fund(&app.address, amount + ALGO);

    let alice_before = h.algorand.account_balance(&h.alice.algorand_address()).await.unwrap();
    let bob_before = h.algorand.account_balance(&h.bob.algorand_address()).await.unwrap();
    let tx_id = h.engine.refund_invoice(&reference, &h.alice).await.unwrap();
    assert!(!tx_id.is_empty());

    // Only the application call's doubled fee, no top-up payment.
    let alice_after = h.algorand.account_balance(&h.alice.algorand_address()).await.unwrap();
    assert_eq!(alice_before - alice_after, 2 * MIN_TXN_FEE);
    let bob_after = h.algorand.account_balance(&h.bob.algorand_address()).await.unwrap();
    assert_eq!(bob_after - bob_before, amount);
    assert_eq!(h.algorand.account_balance(&app.address).await.unwrap(), ALGO);

    let details = h.engine.get_invoice_details(&reference).await.unwrap();
    assert_eq!(details.status, InvoiceStatus::Refunded);
    assert_eq!(details.tx_ids.last(), Some(&tx_id));
}

#[tokio::test]
async fn test_escrow_rejected_on_algorand() {
    let h = harness(Blockchain::Algorand).await;
    let result = h
        .engine
        .create_invoice(&h.params(Blockchain::Algorand, "INV-ESC", ALGO as u128, true), &h.alice)
        .await;
    assert!(matches!(result, Err(SettlementError::Validation(_))));
}
