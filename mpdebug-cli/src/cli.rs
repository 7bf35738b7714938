//! Command-line definition and argument extraction

use std::path::PathBuf;

use clap::{Arg, ArgAction, ArgMatches, Command};
use mpdebug_core::*;

/// Build the `mpdebug` command tree
pub fn build() -> Command {
    Command::new("mpdebug")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Debug multipart uploads against S3-compatible object stores")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("endpoint")
                .long("endpoint")
                .value_name("HOST[:PORT]")
                .help("Object store endpoint [env: ENDPOINT]")
                .global(true),
        )
        .arg(
            Arg::new("accesskey")
                .long("accesskey")
                .value_name("KEY")
                .help("Access key [env: ACCESS_KEY]")
                .global(true),
        )
        .arg(
            Arg::new("secretkey")
                .long("secretkey")
                .value_name("KEY")
                .help("Secret key [env: SECRET_KEY]")
                .global(true),
        )
        .arg(
            Arg::new("region")
                .long("region")
                .value_name("REGION")
                .help("Signing region [env: REGION, default: us-east-1]")
                .global(true),
        )
        .arg(
            Arg::new("secure")
                .long("secure")
                .help("Use https when the endpoint has no scheme [env: SECURE=1]")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("trace")
                .long("trace")
                .help("Log every request and response to stderr [env: TRACE=1]")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .subcommand(multipart())
}

fn multipart() -> Command {
    Command::new("multipart")
        .about("Step through the multipart upload API one call at a time")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("new")
                .about("Initiate an upload and print its upload id")
                .arg(positional("bucket"))
                .arg(positional("object"))
                .arg(
                    Arg::new("encrypt")
                        .long("encrypt")
                        .help("Request server-side encryption")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("upload")
                .about("Upload one file as a part")
                .arg(positional("bucket"))
                .arg(positional("object"))
                .arg(positional("uploadID"))
                .arg(positional("partNumber"))
                .arg(positional("filePath")),
        )
        .subcommand(
            Command::new("complete")
                .about("Complete an upload from <partNumber>.<etag> arguments")
                .arg(positional("bucket"))
                .arg(positional("object"))
                .arg(positional("uploadID"))
                .arg(
                    Arg::new("parts")
                        .value_name("partNumber.etag")
                        .required(true)
                        .num_args(1..),
                ),
        )
        .subcommand(
            Command::new("listuploads")
                .about("List in-progress uploads of a bucket")
                .arg(positional("bucket"))
                .arg(option("prefix"))
                .arg(option("keymarker"))
                .arg(option("uploadidmarker"))
                .arg(
                    Arg::new("delimiter")
                        .long("delimiter")
                        .help("Group keys by '/'")
                        .action(ArgAction::SetTrue),
                )
                .arg(count("maxuploads")),
        )
        .subcommand(
            Command::new("listparts")
                .about("List the uploaded parts of an upload")
                .arg(positional("bucket"))
                .arg(positional("object"))
                .arg(positional("uploadID"))
                .arg(count("partmarker"))
                .arg(count("maxparts")),
        )
        .subcommand(
            Command::new("abort")
                .about("Abort an upload")
                .arg(positional("bucket"))
                .arg(positional("object"))
                .arg(positional("uploadID")),
        )
}

fn positional(name: &'static str) -> Arg {
    Arg::new(name).value_name(name).required(true)
}

fn option(name: &'static str) -> Arg {
    Arg::new(name).long(name).value_name("VALUE")
}

fn count(name: &'static str) -> Arg {
    Arg::new(name)
        .long(name)
        .value_name("N")
        .value_parser(clap::value_parser!(u32))
}

/// Connection flags as given on the command line
pub fn config_flags(matches: &ArgMatches) -> ConfigFlags {
    ConfigFlags {
        endpoint: matches.get_one::<String>("endpoint").cloned(),
        access_key: matches.get_one::<String>("accesskey").cloned(),
        secret_key: matches.get_one::<String>("secretkey").cloned(),
        region: matches.get_one::<String>("region").cloned(),
        secure: matches.get_flag("secure"),
        trace: matches.get_flag("trace"),
    }
}

/// A parsed `multipart` subcommand
#[derive(Debug, Clone, PartialEq)]
pub enum Multipart {
    New {
        bucket: BucketName,
        key: ObjectKey,
        options: InitiateOptions,
    },
    Upload {
        session: UploadSession,
        part_number: PartNumber,
        file: PathBuf,
    },
    Complete {
        session: UploadSession,
        parts: Vec<PartDescriptor>,
    },
    ListUploads {
        bucket: BucketName,
        prefix: String,
        cursor: UploadsCursor,
    },
    ListParts {
        session: UploadSession,
        cursor: PartsCursor,
    },
    Abort {
        session: UploadSession,
    },
}

impl Multipart {
    /// Validate the arguments of a `multipart` subcommand
    pub fn from_matches(matches: &ArgMatches) -> Result<Self> {
        let command = match matches.subcommand() {
            Some(("new", m)) => Multipart::New {
                bucket: BucketName::new(value(m, "bucket"))?,
                key: ObjectKey::new(value(m, "object"))?,
                options: InitiateOptions {
                    encrypt: m.get_flag("encrypt"),
                },
            },
            Some(("upload", m)) => Multipart::Upload {
                session: session(m)?,
                part_number: value(m, "partNumber").parse()?,
                file: PathBuf::from(value(m, "filePath")),
            },
            Some(("complete", m)) => Multipart::Complete {
                session: session(m)?,
                parts: parse_completion_parts(m.get_many::<String>("parts").into_iter().flatten())?,
            },
            Some(("listuploads", m)) => Multipart::ListUploads {
                bucket: BucketName::new(value(m, "bucket"))?,
                prefix: m.get_one::<String>("prefix").cloned().unwrap_or_default(),
                cursor: UploadsCursor {
                    key_marker: m.get_one::<String>("keymarker").cloned(),
                    upload_id_marker: m.get_one::<String>("uploadidmarker").cloned(),
                    max_uploads: limit(m, "maxuploads"),
                    delimiter: m.get_flag("delimiter").then(|| "/".to_string()),
                },
            },
            Some(("listparts", m)) => Multipart::ListParts {
                session: session(m)?,
                cursor: PartsCursor {
                    part_marker: limit(m, "partmarker"),
                    max_parts: limit(m, "maxparts"),
                },
            },
            Some(("abort", m)) => Multipart::Abort { session: session(m)? },
            Some((other, _)) => {
                return Err(MpError::Input(format!("unknown multipart command '{}'", other)))
            }
            None => return Err(MpError::Input("a multipart command is required".to_string())),
        };
        Ok(command)
    }
}

fn value<'a>(matches: &'a ArgMatches, id: &str) -> &'a str {
    matches
        .get_one::<String>(id)
        .map(String::as_str)
        .unwrap_or_default()
}

/// Zero means "not given"
fn limit(matches: &ArgMatches, id: &str) -> Option<u32> {
    matches.get_one::<u32>(id).copied().filter(|n| *n > 0)
}

fn session(matches: &ArgMatches) -> Result<UploadSession> {
    Ok(UploadSession::new(
        BucketName::new(value(matches, "bucket"))?,
        ObjectKey::new(value(matches, "object"))?,
        UploadId::new(value(matches, "uploadID")),
    ))
}
