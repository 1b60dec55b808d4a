use thiserror::Error;

use crate::model::{IdError, PerformanceError, ProgressError, SettingsError};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Id(#[from] IdError),
    #[error(transparent)]
    Progress(#[from] ProgressError),
    #[error(transparent)]
    Performance(#[from] PerformanceError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EngineSettingsDraft, UserId};

    fn parse_user(raw: &str) -> Result<UserId, Error> {
        Ok(UserId::new(raw)?)
    }

    #[test]
    fn model_errors_convert_into_aggregate() {
        assert!(matches!(parse_user(" "), Err(Error::Id(_))));

        let draft = EngineSettingsDraft {
            recommendation_limit: Some(0),
            ..EngineSettingsDraft::default()
        };
        let err: Error = draft.validate().unwrap_err().into();
        assert!(matches!(err, Error::Settings(_)));
    }
}
