use std::error::Error;
use std::path::PathBuf;

use common::decide::Decision;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct OpContext {
    /// Optional custom state directory (defaults to ~/.warden)
    pub config_path: Option<PathBuf>,
    /// Fixed answer for every conflict, `None` to ask on the terminal
    pub decision: Option<Decision>,
    /// Cancelled on Ctrl-C
    pub cancel: CancellationToken,
}

impl OpContext {
    pub fn new(
        config_path: Option<PathBuf>,
        decision: Option<Decision>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config_path,
            decision,
            cancel,
        }
    }
}

#[async_trait::async_trait]
pub trait Op: Send + Sync {
    type Error: Error + Send + Sync + 'static;
    type Output;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error>;
}

/// Compose op types into the `Command` subcommand enum
///
/// Each `(Variant, Type)` pair becomes a subcommand whose output and error
/// are wrapped in `OpOutput` and `OpError`. `Command::name` gives the
/// subcommand's name for log spans.
#[macro_export]
macro_rules! command_enum {
    ($(($variant:ident, $type:ty)),* $(,)?) => {
        #[derive(Subcommand, Debug, Clone)]
        pub enum Command {
            $($variant($type),)*
        }

        impl Command {
            pub fn name(&self) -> &'static str {
                match self {
                    $(Command::$variant(_) => stringify!($variant),)*
                }
            }
        }

        #[derive(Debug)]
        pub enum OpOutput {
            $($variant(<$type as $crate::op::Op>::Output),)*
        }

        impl std::fmt::Display for OpOutput {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(OpOutput::$variant(output) => std::fmt::Display::fmt(output, f),)*
                }
            }
        }

        #[derive(Debug, thiserror::Error)]
        pub enum OpError {
            $(
                #[error(transparent)]
                $variant(<$type as $crate::op::Op>::Error),
            )*
        }

        #[async_trait::async_trait]
        impl $crate::op::Op for Command {
            type Output = OpOutput;
            type Error = OpError;

            async fn execute(
                &self,
                ctx: &$crate::op::OpContext,
            ) -> Result<Self::Output, Self::Error> {
                match self {
                    $(
                        Command::$variant(op) => match op.execute(ctx).await {
                            Ok(output) => Ok(OpOutput::$variant(output)),
                            Err(e) => Err(OpError::$variant(e)),
                        },
                    )*
                }
            }
        }
    };
}
