//! Command-line front end for the parameter-sweep engine
//!
//! Loads a YAML sweep file, runs it on the bundled tank model across
//! in-process workers and writes the results as CSV.

pub mod csv_writer;
pub mod definition;
pub mod demo_model;
pub mod logging;
pub mod runner;

pub use csv_writer::CsvWriter;
pub use definition::{OutputEntry, ParameterEntry, SweepFile};
pub use demo_model::{DerivedQuantity, TankModel, TankSettings};
pub use logging::init_logging;
pub use runner::{SweepMode, run};
