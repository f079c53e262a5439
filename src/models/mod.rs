mod item;
mod list;
mod role;
mod share;
mod user;

pub use item::Item;
pub use list::ShoppingList;
pub use role::Role;
pub use share::{Share, ShareState};
pub use user::{Actor, User};
