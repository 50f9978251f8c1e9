//! Shop business rules built on the delegates.
//!
//! # Services
//!
//! - `drops` - Drop windows and password unlocks
//! - `addresses` - Default shipping address switching
//! - `checkout` - Order placement with stock reservation
//! - `orders` - Order status lifecycle

mod addresses;
mod checkout;
mod drops;
mod orders;

pub use addresses::set_default_address;
pub use checkout::{CheckoutError, OrderLine, PlaceOrder, place_order};
pub use drops::{DropError, DropService};
pub use orders::{OrderStatusError, advance_order_status};
