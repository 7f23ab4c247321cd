//! Database connection and initialization.

pub use fieldcast_core::db::DatabaseError;

fieldcast_core::define_database!(NotifyDatabase, "Notification schema up to date");
