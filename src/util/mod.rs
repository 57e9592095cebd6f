/*!
Small helpers shared by the cursor and the engine adapters.
*/

pub(crate) mod interpolate;
pub mod search;
pub(crate) mod utf8;
