// Copyright (c) the medjpeg Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Logging macros that forward to `tracing` when the `tracing` feature is
//! enabled and expand to nothing otherwise.

#[cfg(feature = "tracing")]
#[allow(unused_imports)]
pub use tracing::{debug, error, info, trace, warn};

#[cfg(not(feature = "tracing"))]
macro_rules! debug {
    ($($arg:tt)*) => {
        ()
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! error {
    ($($arg:tt)*) => {
        ()
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! info {
    ($($arg:tt)*) => {
        ()
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace {
    ($($arg:tt)*) => {
        ()
    };
}

// Named apart from the builtin `warn` lint attribute, which a plain
// `use warn` would be ambiguous with.
#[cfg(not(feature = "tracing"))]
macro_rules! warn_event {
    ($($arg:tt)*) => {
        ()
    };
}

#[cfg(not(feature = "tracing"))]
#[allow(unused_imports)]
pub(crate) use {debug, error, info, trace, warn_event as warn};

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn macros_are_expressions() {
        let n = 3;
        let () = match n {
            0 => trace!(n, "zero"),
            1 => debug!(n, "one"),
            2 => info!(n, "two"),
            3 => warn!(n, "three"),
            _ => error!(n, "other"),
        };
    }
}
