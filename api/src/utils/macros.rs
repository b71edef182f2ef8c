//! Helper macros for the clipforge core

/// Serialize data to a string
#[doc(hidden)]
#[macro_export]
macro_rules! serialize {
    ($data:expr) => {
        match serde_json::to_string($data) {
            Ok(serial) => serial,
            Err(e) => return $crate::bad!(format!("Failed to serialize data with error {}", e)),
        }
    };
}

/// Serialize data to a string or panic trying
#[doc(hidden)]
#[macro_export]
macro_rules! force_serialize {
    ($data:expr) => {
        match serde_json::to_string($data) {
            Ok(serial) => serial,
            Err(e) => panic!("Failed to serialize data with error {}", e),
        }
    };
}

/// Deserialize data from a string
#[doc(hidden)]
#[macro_export]
macro_rules! deserialize {
    ($data:expr) => {
        match serde_json::from_str($data) {
            Ok(serial) => serial,
            Err(e) => return $crate::bad!(format!("Failed to deserialize data with error {}", e)),
        }
    };
    ($data:expr, $key:expr) => {
        match serde_json::from_str($data) {
            Ok(serial) => serial,
            Err(e) => {
                return $crate::bad!(format!("Failed to deserialize {} with error {}", $key, e))
            }
        }
    };
}

/// Extract a string from a map and deserialize it
#[doc(hidden)]
#[macro_export]
macro_rules! deserialize_ext {
    ($map:expr, $key:expr) => {
        match $map.get($key) {
            Some(data) => $crate::deserialize!(data, $key),
            None => return $crate::bad!(format!("Failed to extract {}", $key)),
        }
    };
    ($map:expr, $key:expr, $def:expr) => {
        match $map.get($key) {
            Some(data) => $crate::deserialize!(data, $key),
            None => $def,
        }
    };
}

/// Deserialize data from a string wrapped in an option
#[doc(hidden)]
#[macro_export]
macro_rules! deserialize_opt {
    ($map:expr, $key:expr) => {
        match $map.get($key) {
            Some(data) => Some($crate::deserialize!(data, $key)),
            None => None,
        }
    };
    ($map:expr, $key:expr, $func:expr) => {
        match $map.get($key) {
            Some(data) => Some($func(data)?),
            None => None,
        }
    };
}

/// Extract a value from a map
#[doc(hidden)]
#[macro_export]
macro_rules! extract {
    ($map:expr, $key:expr) => {
        match $map.remove($key) {
            Some(value) => value,
            None => return $crate::bad!(format!("Failed to extract {}", $key)),
        }
    };
    ($map:expr, $key:expr, $default:expr) => {
        match $map.remove($key) {
            Some(value) => value,
            None => $default,
        }
    };
}

/// Logs an error that would normally be lost by an iterator filter
#[doc(hidden)]
#[macro_export]
macro_rules! log_err {
    ($result:expr) => {
        // log error if it exists
        match $result {
            Ok(res) => Some(res),
            Err(error) => {
                tracing::event!(tracing::Level::ERROR, msg = %error);
                None
            }
        }
    };
}

/// Update a value if the new value is not None
#[doc(hidden)]
#[macro_export]
macro_rules! update_opt {
    ($orig:expr, $update:expr) => {
        if let Some(new) = $update.take() {
            $orig = Some(new);
        }
    };
}
