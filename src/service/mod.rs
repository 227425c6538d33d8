mod contacts;
mod groups;

pub use contacts::ContactService;
pub use groups::GroupService;
