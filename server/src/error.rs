pub use anyhow::{bail, ensure, Context, Result};
