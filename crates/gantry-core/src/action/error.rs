use snafu::Snafu;

#[derive(Snafu, Debug)]
#[snafu(visibility(pub))]
pub enum ActionError {
    #[snafu(display("action was cancelled"))]
    Cancelled,
    #[snafu(display("fleet endpoint unreachable: {source}"))]
    Http { source: reqwest::Error },
    #[snafu(display("fleet endpoint returned status {status}: {body}"))]
    Rejected { status: u16, body: String },
    #[snafu(display("fleet state owner is gone"))]
    Unavailable,
}
