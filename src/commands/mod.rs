//! Command implementations.

mod calendar;
mod discover;
mod label;
mod run;

// Re-export all command argument structs and functions
pub use calendar::{
    CalendarArgs,
    calendar,
};
pub use discover::{
    DiscoverArgs,
    discover,
};
pub use label::{
    LabelArgs,
    label,
};
pub use run::{
    RunArgs,
    run,
    versioning_result,
};
