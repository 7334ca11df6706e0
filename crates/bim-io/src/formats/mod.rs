//! Built-in format plugins, one module per feature.
//!
//! | Module | Feature | Read | Write | Pages |
//! |--------|---------|------|-------|-------|
//! | [`ibw`] | `ibw` | yes | no | 1 |
//! | [`nanoscope`] | `nanoscope` | yes | no | one per image section |
//! | [`nrrd`] | `nrrd` | yes | yes | axes past x/y |

#[cfg(feature = "ibw")]
pub mod ibw;

#[cfg(feature = "nanoscope")]
pub mod nanoscope;

#[cfg(feature = "nrrd")]
pub mod nrrd;
