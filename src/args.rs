use clap::Parser;

/// Converts the results of the two rounds of the French presidential election
/// into one long table, with one row per commune, candidate and round.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path, optional) A JSON file describing the input files, the output and the rules.
    /// The options below override the values of this file.
    #[clap(short, long, value_parser)]
    pub config: Option<String>,

    /// (file path) The results of the first round.
    #[clap(long, value_parser)]
    pub round1: Option<String>,

    /// (file path) The results of the second round.
    #[clap(long, value_parser)]
    pub round2: Option<String>,

    /// (file path, default parquets/candidat.parquet) Where to write the long table.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (parquet or csv, default parquet) The format of the long table.
    #[clap(long, value_parser)]
    pub output_format: Option<String>,

    /// (xlsx or csv) The type of the round files. By default, guessed from the file extension.
    #[clap(long, value_parser)]
    pub input_type: Option<String>,

    /// When using Excel files, the name of the worksheet to use. By default, the first worksheet.
    #[clap(long, value_parser)]
    pub excel_worksheet_name: Option<String>,

    /// (file path, 'stdout' or empty) If specified, the summary of the run will be written in JSON
    /// format to the given location.
    #[clap(short, long, value_parser)]
    pub summary: Option<String>,

    /// (file path) A reference summary in JSON format. If provided, the program checks that the
    /// summary of the run matches the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// Stops with an error if a candidate of the second round is not found in the first round.
    #[clap(long, takes_value = false)]
    pub fail_on_unresolved: bool,

    /// Ignores the case when matching the names of the candidates between the rounds.
    #[clap(long, takes_value = false)]
    pub case_insensitive_names: bool,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
