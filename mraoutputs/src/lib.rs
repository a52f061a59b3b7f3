//! Output routing and per-transport output drivers.
//!
//! Every renderer bound to a zone implements the [`ZoneOutput`] capability;
//! the [`OutputRouter`] fans lifecycle actions out to a zone's outputs with
//! strict ordering, per-output wall-clock bounds, and failure isolation.
//!
//! The per-renderer wire protocols are not implemented here: each driver
//! talks to an opaque sender object through a small capability trait and
//! implements the transport's lifecycle, retry, and grouping policies on
//! top of it.

mod capabilities;
mod error;
mod router;
mod soap;

pub mod drivers;

pub use capabilities::{OutputAction, ZoneOutput};
pub use error::OutputError;
pub use router::OutputRouter;
pub use soap::{SoapClient, SoapFault};
