pub mod location;
pub mod profile;

pub use location::LocationService;
pub use profile::ProfileService;
