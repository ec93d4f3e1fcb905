mod common;

use rust_decimal_macros::dec;

use vendlink::application::engine::PaymentGating;
use vendlink::domain::command::CommandStatus;
use vendlink::domain::ports::CommandLedger;

/// Rapid successive purchases: the dispatcher must only ever see the latest.
#[tokio::test]
async fn test_second_purchase_supersedes_first() {
    let (engine, store) = common::engine(PaymentGating::Disabled);
    common::seed_product(&engine, 1, "v1", 3, dec!(2.50), 5).await;
    common::seed_product(&engine, 2, "v1", 4, dec!(1.75), 5).await;

    let first = engine.create_purchase("v1", 1).await.unwrap();
    let second = engine.create_purchase("v1", 2).await.unwrap();

    let first = store.get(first.id).await.unwrap().unwrap();
    assert_eq!(first.status, CommandStatus::Superseded);
    assert_eq!(second.status, CommandStatus::Pending);

    let dispatch = engine.next_command("v1").await.unwrap().unwrap();
    assert_eq!(dispatch.command_id, second.id);
    assert_eq!(dispatch.motor_id, 4);
}

/// After any sequence of creates, a machine holds at most one in-flight
/// command.
#[tokio::test]
async fn test_at_most_one_in_flight_per_machine() {
    let (engine, store) = common::engine(PaymentGating::Disabled);
    common::seed_product(&engine, 1, "v1", 3, dec!(2.50), 10).await;
    common::seed_product(&engine, 2, "v2", 3, dec!(2.50), 10).await;

    let mut last_id = 0;
    for _ in 0..4 {
        last_id = engine.create_purchase("v1", 1).await.unwrap().id;
    }
    engine.create_purchase("v2", 2).await.unwrap();

    let mut in_flight = Vec::new();
    for id in 1..=5u64 {
        let command = store.get(id).await.unwrap().unwrap();
        if command.machine_id == "v1" && command.status.is_in_flight() {
            in_flight.push(command.id);
        }
    }
    assert_eq!(in_flight, vec![last_id]);
}

/// Supersession also clears commands still waiting on payment.
#[tokio::test]
async fn test_gated_command_superseded_by_new_purchase() {
    let (engine, store) = common::engine(PaymentGating::Enabled);
    common::seed_product(&engine, 1, "v1", 3, dec!(2.50), 5).await;

    let first = engine.create_purchase("v1", 1).await.unwrap();
    assert_eq!(first.status, CommandStatus::AwaitingPayment);
    let second = engine.create_purchase("v1", 1).await.unwrap();

    let first = store.get(first.id).await.unwrap().unwrap();
    assert_eq!(first.status, CommandStatus::Superseded);

    // The confirmation applies to the replacement, not the superseded one.
    let confirmed = engine.confirm_payment("v1").await.unwrap();
    assert_eq!(confirmed.id, second.id);
}
