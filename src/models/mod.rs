mod coupon;
mod fulfillment_step;
mod license_template;
mod profile;
mod purchase;
mod transaction;

pub use coupon::*;
pub use fulfillment_step::*;
pub use license_template::*;
pub use profile::*;
pub use purchase::*;
pub use transaction::*;
