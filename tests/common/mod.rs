use rust_decimal::Decimal;

use vendlink::application::engine::{PaymentGating, VendEngine};
use vendlink::domain::ports::ProductStore;
use vendlink::domain::product::{Price, Product};
use vendlink::infrastructure::in_memory::InMemoryVendStore;

pub fn engine(gating: PaymentGating) -> (VendEngine, InMemoryVendStore) {
    let store = InMemoryVendStore::new();
    let engine = VendEngine::new(
        Box::new(store.clone()),
        Box::new(store.clone()),
        Box::new(store.clone()),
        gating,
    );
    (engine, store)
}

pub async fn seed_product(
    engine: &VendEngine,
    id: u32,
    machine: &str,
    motor: u32,
    price: Decimal,
    stock: u32,
) {
    engine
        .products()
        .put(Product::new(
            id,
            machine,
            motor,
            format!("slot-{motor}"),
            Price::new(price).unwrap(),
            stock,
        ))
        .await
        .unwrap();
}
