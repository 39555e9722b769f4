// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

pub mod columns;
pub mod forms;
pub mod record;
pub mod resources;
pub mod session;
pub mod state;
pub mod store;
pub mod table;
pub mod token;

pub use columns::*;
pub use forms::*;
pub use record::*;
pub use resources::*;
pub use session::*;
pub use state::*;
pub use store::*;
pub use table::*;
