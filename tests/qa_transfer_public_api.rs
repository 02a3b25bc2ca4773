use ledger_core::config::AppConfig;
use ledger_core::{
    BalancePolicy, CreateAccountParams, LedgerError, MemoryStore, TransferOrchestrator,
    TransferParams,
};

/// Helper: orchestrator with one account per opening balance
async fn ledger_with(
    balances: &[i64],
    policy: BalancePolicy,
) -> (TransferOrchestrator<MemoryStore>, MemoryStore, Vec<i64>) {
    let store = MemoryStore::new();
    let orchestrator = TransferOrchestrator::new(store.clone(), policy);
    let mut ids = Vec::new();
    for (i, balance) in balances.iter().enumerate() {
        let account = orchestrator
            .create_account(CreateAccountParams::new(format!("qa{}", i), *balance, "EUR"))
            .await
            .expect("create account");
        ids.push(account.id);
    }
    (orchestrator, store, ids)
}

#[tokio::test]
async fn qa_tc_transfer_example_through_public_api() {
    let (ledger, _, ids) = ledger_with(&[100, 50], BalancePolicy::AllowNegative).await;

    let result = ledger
        .transfer(TransferParams::new(ids[0], ids[1], 30))
        .await
        .unwrap();

    assert_eq!(result.from_account.balance, 70);
    assert_eq!(result.to_account.balance, 80);
    assert_eq!(result.from_entry.amount, -30);
    assert_eq!(result.to_entry.amount, 30);
    assert_eq!(result.transfer.amount, 30);

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["to_account"]["balance"], 80);
    assert_eq!(json["transfer"]["amount"], 30);
}

#[tokio::test]
async fn qa_tc_chain_of_transfers_conserves_total() {
    let (ledger, store, ids) = ledger_with(&[300, 200, 100], BalancePolicy::AllowNegative).await;
    let total = store.total_balance();

    // Ring: 0 -> 1 -> 2 -> 0, then reverse
    for (from, to, amount) in [(0, 1, 40), (1, 2, 90), (2, 0, 15), (0, 2, 5), (2, 1, 60)] {
        ledger
            .transfer(TransferParams::new(ids[from], ids[to], amount))
            .await
            .unwrap();
        assert_eq!(store.total_balance(), total);
    }

    let balances: Vec<i64> = ledger
        .list_accounts(10, 0)
        .await
        .unwrap()
        .iter()
        .map(|a| a.balance)
        .collect();
    assert_eq!(balances, vec![270, 210, 120]);
}

#[tokio::test]
async fn qa_tc_overdraft_policy_is_configurable() {
    let (lenient, _, ids) = ledger_with(&[70, 0], BalancePolicy::AllowNegative).await;
    let result = lenient
        .transfer(TransferParams::new(ids[0], ids[1], 1000))
        .await
        .unwrap();
    assert_eq!(result.from_account.balance, -930);

    let (strict, store, ids) = ledger_with(&[70, 0], BalancePolicy::RejectOverdraft).await;
    let err = strict
        .transfer(TransferParams::new(ids[0], ids[1], 1000))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientFunds { balance: 70, .. }));
    assert_eq!(store.transfer_count(), 0);
}

#[tokio::test]
async fn qa_tc_rejects_invalid_requests() {
    let (ledger, _, ids) = ledger_with(&[10, 10], BalancePolicy::AllowNegative).await;

    for params in [
        TransferParams::new(ids[0], ids[0], 5),
        TransferParams::new(ids[0], ids[1], 0),
        TransferParams::new(ids[0], ids[1], -1),
    ] {
        let err = ledger.transfer(params).await.unwrap_err();
        assert_eq!(err.code(), "CONSTRAINT_VIOLATION", "{}", params);
    }

    let err = ledger.get_account(12345).await.unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");

    let err = ledger
        .create_account(CreateAccountParams::new("", 0, "EUR"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "CONSTRAINT_VIOLATION");
}

#[test]
fn qa_tc_shipped_configs_parse() {
    for env in ["dev", "prod"] {
        let config = AppConfig::load(env).unwrap_or_else(|e| panic!("{}: {:#}", env, e));
        assert!(config.ledger.lock_timeout_ms > 0);
    }
    let prod = AppConfig::load("prod").unwrap();
    assert_eq!(prod.ledger.balance_policy, BalancePolicy::RejectOverdraft);
}
