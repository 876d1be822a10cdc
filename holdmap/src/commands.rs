use crate::CLAP_STYLING;
use clap::{ArgAction, arg, command};

const DEFAULT_CONFIG_DIR: &str = "~/.config/holdmap/";

pub(crate) fn command_argument_builder() -> clap::Command {
    clap::Command::new("holdmap")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("holdmap")
        .styles(CLAP_STYLING)
        .arg(arg!(-q --"quiet" "Suppress banner and non-essential output").required(false))
        .arg(
            arg!(-v --"verbose" "Increase log verbosity (-v info, -vv debug)")
                .required(false)
                .action(ArgAction::Count),
        )
        .subcommand_required(false)
        .subcommand(
            command!("init")
                .about("Initializes an empty registry database on your filesystem")
                .arg(
                    arg!([PATH])
                        .required(false)
                        .help("Directory (or .db file) for the registry database")
                        .default_value(DEFAULT_CONFIG_DIR),
                )
                .arg(
                    arg!(-f - -"force")
                        .help("Overwrite any existing database at the specified location.")
                        .required(false),
                ),
        )
        .subcommand(
            command!("crawl")
                .about(
                    "Expand the ownership network around one or more companies or persons, \
                up to a maximum depth.",
                )
                .arg(
                    arg!(--"db" <PATH>)
                        .required(false)
                        .help("Registry database (directory or .db file)")
                        .default_value(DEFAULT_CONFIG_DIR),
                )
                .arg(
                    arg!(-c --"company" <CNPJ>)
                        .required(false)
                        .help("Company tax id to start from (repeatable)")
                        .action(ArgAction::Append),
                )
                .arg(
                    arg!(-p --"person" <PERSON>)
                        .required(false)
                        .help("Person to start from as TAX_ID:NAME, tax id as masked in the registry (repeatable)")
                        .action(ArgAction::Append),
                )
                .arg(
                    arg!(-s --"search" <QUERY>)
                        .required(false)
                        .help("Start from every partner matching a tax id or name (repeatable)")
                        .action(ArgAction::Append),
                )
                .arg(
                    arg!(-S --"seeds-file" <PATH>)
                        .required(false)
                        .help("Newline-delimited seeds: PJ:<cnpj>, PF:<cpf>:<name>, SEARCH:<query> or a bare CNPJ")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                )
                .arg(
                    arg!(-d --"max-depth" <DEPTH>)
                        .required(false)
                        .help("Maximum number of hops from a seed")
                        .value_parser(clap::value_parser!(u32).range(1..))
                        .default_value("1"),
                )
                .arg(
                    arg!(-Q --"qualifications" <CODES>)
                        .required(false)
                        .help("Comma separated qualification codes to follow, or ALL")
                        .default_value("ALL"),
                )
                .arg(
                    arg!(--"timeout" <SECONDS>)
                        .required(false)
                        .help("Stop the crawl after this many seconds and keep the partial graph")
                        .value_parser(clap::value_parser!(u64)),
                )
                .arg(
                    arg!(-o --"output" <PATH>)
                        .required(false)
                        .help("Export the graph to this file (default: summary only)")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                )
                .arg(
                    arg!(-f --"format" <FORMAT>)
                        .required(false)
                        .help("Export format: json, graphml, gexf, csv")
                        .value_parser(["json", "graphml", "gexf", "csv"])
                        .default_value("json"),
                )
                .arg(
                    arg!(--"no-progress")
                        .required(false)
                        .help("Disable the progress spinner")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            command!("search")
                .about("List the partners matching a tax id or a name")
                .arg(arg!(<QUERY>).help("Tax id (masked or punctuated) or partner name"))
                .arg(
                    arg!(--"db" <PATH>)
                        .required(false)
                        .help("Registry database (directory or .db file)")
                        .default_value(DEFAULT_CONFIG_DIR),
                ),
        )
}
