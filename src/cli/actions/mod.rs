pub mod enroll;

use anyhow::Result;

#[derive(Debug)]
pub enum Action {
    Enroll(enroll::Args),
}

impl Action {
    /// Execute the action.
    /// # Errors
    /// Returns an error if the action fails.
    pub async fn execute(self) -> Result<()> {
        match self {
            Self::Enroll(args) => enroll::execute(args).await,
        }
    }
}
