//! Background services: Immich sync, the plate-solve worker, sidecar
//! rendering and the event bus they report through.

pub mod events;
pub mod plate_solver;
pub mod sync;
pub mod xmp;
