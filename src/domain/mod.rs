pub mod department;
pub mod role;
pub mod user;

pub use department::{Department, DepartmentPolicy};
pub use role::{Role, RolePolicy, RESERVED_ROLE_CODES};
pub use user::{User, UserPolicy};

use crate::store::traits::Store;

/// A store that can hold every demo entity.
pub trait DomainStore: Store<Department> + Store<Role> + Store<User> + 'static {}

impl<T> DomainStore for T where T: Store<Department> + Store<Role> + Store<User> + 'static {}
