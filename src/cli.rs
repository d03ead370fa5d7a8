//! Command-line interface.
//!
//! `pingcrm` with no subcommand (or `pingcrm serve`) runs the HTTP server. The
//! `users` group manages accounts directly against the database.

use clap::{Arg, ArgAction, ArgMatches, Command};

use crate::{errors::AppError, models::UserCreate};

pub const ARG_EMAIL: &str = "email";
pub const ARG_PASSWORD: &str = "password";
pub const ARG_NAME: &str = "name";
pub const ARG_SUPERUSER: &str = "superuser";
pub const ARG_INITIAL_ACCOUNT: &str = "initial-account";

/// Action
///
/// What `main` should do after argument parsing.
#[derive(Debug, Clone)]
pub enum Action {
    Serve,
    CreateUser(UserCreate),
    PromoteToSuperuser { email: String },
}

#[must_use]
pub fn new() -> Command {
    Command::new("pingcrm")
        .about("Ping CRM server and administration commands")
        .version(env!("CARGO_PKG_VERSION"))
        .subcommand(Command::new("serve").about("Run the HTTP server"))
        .subcommand(
            Command::new("users")
                .about("Manage application users")
                .subcommand_required(true)
                .arg_required_else_help(true)
                .subcommand(
                    Command::new("create-user")
                        .about("Create a user")
                        .arg(
                            Arg::new(ARG_EMAIL)
                                .long(ARG_EMAIL)
                                .help("Email of the new user")
                                .required(true),
                        )
                        .arg(
                            Arg::new(ARG_PASSWORD)
                                .long(ARG_PASSWORD)
                                .help("Password")
                                .env("PINGCRM_USER_PASSWORD")
                                .hide_env_values(true)
                                .required(true),
                        )
                        .arg(
                            Arg::new(ARG_NAME)
                                .long(ARG_NAME)
                                .help("Full name of the new user"),
                        )
                        .arg(
                            Arg::new(ARG_SUPERUSER)
                                .long(ARG_SUPERUSER)
                                .help("Create the user as a superuser")
                                .action(ArgAction::SetTrue),
                        )
                        .arg(
                            Arg::new(ARG_INITIAL_ACCOUNT)
                                .long(ARG_INITIAL_ACCOUNT)
                                .help("Name of an account to create with the user as owner"),
                        ),
                )
                .subcommand(
                    Command::new("promote-to-superuser")
                        .about("Promotes a user to application superuser")
                        .arg(
                            Arg::new(ARG_EMAIL)
                                .long(ARG_EMAIL)
                                .help("Email of the user to promote")
                                .required(true),
                        ),
                ),
        )
}

/// Maps parsed arguments to an `Action`.
///
/// # Errors
/// Returns `ValidationFailed` when a required value is missing.
pub fn dispatch(matches: &ArgMatches) -> Result<Action, AppError> {
    match matches.subcommand() {
        None | Some(("serve", _)) => Ok(Action::Serve),
        Some(("users", users)) => match users.subcommand() {
            Some(("create-user", args)) => Ok(Action::CreateUser(UserCreate {
                email: required(args, ARG_EMAIL)?,
                password: required(args, ARG_PASSWORD)?,
                name: args.get_one::<String>(ARG_NAME).cloned(),
                is_superuser: args.get_flag(ARG_SUPERUSER),
                is_active: true,
                is_verified: false,
                initial_account: args.get_one::<String>(ARG_INITIAL_ACCOUNT).cloned(),
            })),
            Some(("promote-to-superuser", args)) => Ok(Action::PromoteToSuperuser {
                email: required(args, ARG_EMAIL)?,
            }),
            _ => Err(AppError::ValidationFailed(
                "unknown users subcommand".to_string(),
            )),
        },
        Some((other, _)) => Err(AppError::ValidationFailed(format!(
            "unknown command: {other}"
        ))),
    }
}

fn required(matches: &ArgMatches, id: &str) -> Result<String, AppError> {
    matches
        .get_one::<String>(id)
        .cloned()
        .ok_or_else(|| AppError::ValidationFailed(format!("missing required argument: --{id}")))
}
