//! Fixtures shared by the unit tests of every module.

use chrono::{DateTime, Duration, TimeZone, Utc};

use stockbook_core::{Branch, Money, Product, Quantity};

use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::requests::{CreateProductRequest, VariantInput};

/// A fresh in-memory engine with one branch.
pub async fn engine_with_branch(code: &str) -> (Engine, Branch) {
    let engine = Engine::open(EngineConfig::in_memory()).await.unwrap();
    let branch = engine
        .create_branch(&format!("{} Branch", code), code)
        .await
        .unwrap();
    (engine, branch)
}

/// Midnight UTC, `n` days after 1 March 2024.
pub fn day(n: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap() + Duration::days(n)
}

/// Cartons of 12 pieces: 300 cost, 360 a carton, 35 a piece.
pub fn biscuits_request(branch_id: &str, cartons: i64) -> CreateProductRequest {
    CreateProductRequest {
        branch_id: branch_id.to_string(),
        name: "Biscuits".into(),
        category: Some("Snacks".into()),
        unit_cost: Money::from_major(300),
        variants: vec![
            VariantInput::base("CARTON", Money::from_major(360)),
            VariantInput::per_base("PIECE", 12, Money::from_major(35)),
        ],
        opening_quantity: Quantity::from_whole(cartons),
        date: day(0),
        operator: None,
    }
}

pub async fn create_biscuits(engine: &Engine, branch_id: &str, cartons: i64) -> Product {
    engine
        .create_product(biscuits_request(branch_id, cartons))
        .await
        .unwrap()
}

/// Loose rice sold by the kilogram.
pub async fn create_rice(engine: &Engine, branch_id: &str, kg: i64) -> Product {
    engine
        .create_product(CreateProductRequest {
            branch_id: branch_id.to_string(),
            name: "Rice".into(),
            category: None,
            unit_cost: Money::from_major(1),
            variants: vec![VariantInput::base("KG", Money::from_major(2))],
            opening_quantity: Quantity::from_whole(kg),
            date: day(0),
            operator: None,
        })
        .await
        .unwrap()
}
