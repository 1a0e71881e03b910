//! Builtin echo walkthrough
//!
//! Logs in as the platform admin, provisions a user, registers the
//! `builtin-echo` function as that user, runs one task, and prints the
//! echoed message on stdout.
//!
//! Run with:
//! ```bash
//! TEACLAVE_AUTHENTICATION_SERVICE_ADDRESS=https://localhost:7776 \
//! TEACLAVE_FRONTEND_SERVICE_ADDRESS=https://localhost:7777 \
//! cargo run --example builtin_echo -- --message "Hello, Teaclave!"
//! ```

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use teaclave_client::{
    AuthenticationClient, ClientConfig, Credential, ExecutorType, FrontendClient,
    FunctionArgument, FunctionArguments, FunctionDescriptor, TaskRequest, UserRegistration,
    UserRole,
};

#[derive(Parser, Debug)]
#[command(name = "builtin_echo", about = "Run the builtin echo function on Teaclave")]
struct Args {
    /// TOML client configuration; environment variables are used otherwise
    #[arg(long, env = "TEACLAVE_CLIENT_CONFIG")]
    config: Option<PathBuf>,

    /// Platform admin account
    #[arg(long, default_value = "admin")]
    admin_id: String,

    /// Platform admin password
    #[arg(long, env = "TEACLAVE_ADMIN_PASSWORD", default_value = "teaclave")]
    admin_password: String,

    /// Account to provision and run the task as
    #[arg(long, default_value = "test_id")]
    user_id: String,

    /// Password of the provisioned account
    #[arg(long, env = "TEACLAVE_USER_PASSWORD", default_value = "test_password")]
    user_password: String,

    /// Message to echo
    #[arg(long, default_value = "Hello, Teaclave!")]
    message: String,
}

async fn provision_user(config: &ClientConfig, args: &Args) -> anyhow::Result<Credential> {
    let mut auth = AuthenticationClient::connect(&config.authentication_endpoint())
        .await
        .context("connecting to the authentication service")?;

    let outcome = async {
        let admin = auth.login(&args.admin_id, &args.admin_password).await?;
        match auth
            .register_user(&admin, &args.user_id, &args.user_password, UserRole::FunctionOwner)
            .await?
        {
            UserRegistration::Created => tracing::info!(user = %args.user_id, "Provisioned user"),
            UserRegistration::AlreadyExists => {
                tracing::info!(user = %args.user_id, "User already provisioned")
            },
        }
        auth.login(&args.user_id, &args.user_password).await
    }
    .await;

    if let Err(e) = auth.close().await {
        tracing::warn!(error = %e, "Failed to close authentication session");
    }
    Ok(outcome?)
}

async fn run_echo(
    config: &ClientConfig,
    credential: Credential,
    message: String,
) -> anyhow::Result<String> {
    let mut client = FrontendClient::connect(&config.frontend_endpoint())
        .await
        .context("connecting to the frontend service")?;
    client.use_credential(credential);

    let poll = config.poll.clone();
    let result = client
        .run(move |c| {
            Box::pin(async move {
                let echo = FunctionDescriptor::new("builtin-echo", ExecutorType::Builtin)
                    .with_description("Native Echo Function")
                    .with_argument(FunctionArgument::new("message", "", true));
                let function_id = c.register_function(&echo).await?;

                let args = FunctionArguments::new().with("message", message);
                let task_id = c.create_task(&TaskRequest::new(function_id, args)).await?;
                c.invoke_task(&task_id).await?;

                c.wait_for_task_result(&task_id, &poll, &CancellationToken::new())
                    .await
            })
        })
        .await?;

    Ok(result.as_str()?.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    teaclave_client::init_logging("info");

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => ClientConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ClientConfig::from_env()?,
    };

    let credential = provision_user(&config, &args).await?;
    let output = run_echo(&config, credential, args.message.clone()).await?;

    println!("{}", output);
    Ok(())
}
