/// Declare a constant holding the name of an env variable.
#[macro_export]
macro_rules! env_var {
    ($name:ident) => {
        pub const $name: &'static str = stringify!($name);
    };
}

/// Read an env variable and feed it to a validating constructor.
///
/// Must be used in a function returning a `Result` whose error converts
/// from the one of the constructor and from [`std::env::VarError`].
#[macro_export]
macro_rules! env_load {
    ($type:ident, $name:ident) => {
        $type::new(std::env::var($name)?)?
    };
    ($type:ident, $name:ident, $type_raw:ident) => {
        $type::new(std::env::var($name)?.parse::<$type_raw>()?)?
    };
}

/// Like [`env_load`], but yields `None` when the variable is not set.
#[macro_export]
macro_rules! env_load_opt {
    ($type:ident, $name:ident) => {
        match std::env::var($name) {
            Ok(value) => Some($type::new(value)?),
            Err(std::env::VarError::NotPresent) => None,
            Err(err) => return Err(err.into()),
        }
    };
}
