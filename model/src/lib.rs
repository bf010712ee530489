use std::fmt;

use serde::{Deserialize, Serialize};

/// encapsulate the numeric ids handed out by the frontend in custom structs
/// to let the compiler differentiate them
macro_rules! impl_id_encapsulation {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            Serialize,
            Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name {
            id: u64,
        }

        impl From<u64> for $name {
            #[inline(always)]
            fn from(id: u64) -> Self { $name { id } }
        }

        impl From<$name> for u64 {
            #[inline(always)]
            fn from(id: $name) -> u64 { id.id }
        }

        impl fmt::Display for $name {
            #[inline(always)]
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "{}", self.id)
            }
        }
    };
}

impl_id_encapsulation!(AppRequirementsId);
impl_id_encapsulation!(FunctionId);

/// Opaque bearer value returned by the frontend, sent back in the `token`
/// header of every subsequent request.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Token(String);

impl Token {
    pub fn new(token: impl Into<String>) -> Self { Token(token.into()) }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token(<{} chars>)", self.0.len())
    }
}

pub mod codec;
pub mod domain;
pub mod dto;
