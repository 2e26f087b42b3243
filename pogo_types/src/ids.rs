use std::fmt;

/// Repository-scoped primary key. Repositories, users and changes all use
/// monotonic integer ids assigned by the database; the wrapper types exist so
/// the id spaces can't be confused with each other at compile time.
macro_rules! int_id {
    ($name:ident) => {
        #[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
        #[derive(serde::Serialize, serde::Deserialize)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(v: i64) -> Self {
                Self(v)
            }
        }

        impl From<$name> for i64 {
            fn from(v: $name) -> Self {
                v.0
            }
        }
    };
}

int_id!(RepositoryId);
int_id!(UserId);
int_id!(ChangeId);
