pub mod clock;
pub mod jwt;
pub mod password;
pub mod policy;
pub mod storage;

pub use clock::{Clock, FixedClock, SystemClock};
pub use jwt::{TokenClaims, TokenPair, TokenService};
pub use password::PasswordService;
pub use policy::{DefaultPasswordPolicy, PasswordPolicy, PolicyError};
pub use storage::{MemoryStorage, PgStorage, Storage, StorageSession};
