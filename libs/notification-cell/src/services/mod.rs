pub mod delivery;
pub mod notification;

pub use delivery::{LogDelivery, NotificationDelivery};
pub use notification::NotificationService;
