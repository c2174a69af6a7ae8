use crate::ticket::CommandKind;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Unknown telemetry profile: {0}")]
    UnknownProfile(String),

    #[error("Command {command} is not used by the {profile} profile")]
    CommandNotInProfile {
        command: CommandKind,
        profile: &'static str,
    },
}
