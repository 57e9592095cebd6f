// Logging is entirely optional. When the 'logging' feature is disabled these
// expand to nothing, so call sites never need their own cfg guards.
macro_rules! debug {
    ($($tt:tt)*) => {
        #[cfg(feature = "logging")]
        {
            log::debug!($($tt)*);
        }
    }
}

macro_rules! trace {
    ($($tt:tt)*) => {
        #[cfg(feature = "logging")]
        {
            log::trace!($($tt)*);
        }
    }
}

// A simple macro for defining bitfield accessors and builder style setters.
// The type using it must have a 'bools' field of some unsigned integer type.
macro_rules! define_bool {
    ($bit:expr, $is_fn_name:ident, $set_fn_name:ident) => {
        pub fn $is_fn_name(&self) -> bool {
            self.bools & (0b1 << $bit) > 0
        }

        pub fn $set_fn_name(mut self, yes: bool) -> Self {
            if yes {
                self.bools |= 1 << $bit;
            } else {
                self.bools &= !(1 << $bit);
            }
            self
        }
    };
}
