//! Shared type definitions for the Touchline live-game pipeline.
//!
//! This crate is the single source of truth for the values that move
//! between the poller, the state store, the broadcaster and the
//! transport. Types flow downstream to `TypeScript` via `ts-rs` for
//! dashboard clients.
//!
//! # Modules
//!
//! - [`ids`] -- Entity and subscription identifiers
//! - [`enums`] -- Entity status and play categories
//! - [`structs`] -- Snapshots, artifacts and deliveries
//! - [`fields`] -- Well-known snapshot field names

pub mod enums;
pub mod fields;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{EntityStatus, PlayType, UnknownLabel};
pub use ids::{EntityId, SubscriptionId};
pub use structs::{Alternative, Artifact, ArtifactError, Delivery, EntitySnapshot, FieldValue};

#[cfg(test)]
mod tests {
    //! `TypeScript` binding generation for dashboard clients.

    #[test]
    fn export_bindings() {
        // ts-rs writes the files to `bindings/` relative to the crate
        // root when `export_all` is invoked.
        use ts_rs::TS;

        // IDs
        let _ = crate::ids::EntityId::export_all();
        let _ = crate::ids::SubscriptionId::export_all();

        // Enums
        let _ = crate::enums::EntityStatus::export_all();
        let _ = crate::enums::PlayType::export_all();

        // Structs
        let _ = crate::structs::FieldValue::export_all();
        let _ = crate::structs::EntitySnapshot::export_all();
        let _ = crate::structs::Alternative::export_all();
        let _ = crate::structs::Artifact::export_all();
        let _ = crate::structs::Delivery::export_all();
    }
}
