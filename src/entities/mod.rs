pub mod configuration;
pub mod device_grant;
pub mod login;
pub mod voucher;

pub use configuration::Entity as Configuration;
pub use device_grant::Entity as DeviceGrant;
pub use login::Entity as Login;
pub use voucher::Entity as Voucher;
