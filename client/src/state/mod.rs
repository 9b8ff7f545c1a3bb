//! Client-side state: the mirrored auction, the server clock estimate, and
//! ephemeral notifications.
//!
//! SYSTEM CONTEXT
//! ==============
//! Every piece here is a cloneable handle over shared interior state. The sync
//! controller is the only writer; presentation code reads and watches.

pub mod auction;
pub mod clock;
pub mod notifications;
