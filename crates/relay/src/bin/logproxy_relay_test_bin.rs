use logproxy_relay::RelayError;
use std::process::ExitCode;

fn main() -> ExitCode {
    logproxy_relay::init_tracing();

    match logproxy_relay::run() {
        Ok(code) => ExitCode::from(code),
        Err(RelayError::Usage(err)) => err.exit(),
        Err(err) => {
            eprintln!("logproxy: {err}");
            ExitCode::from(err.exit_code())
        }
    }
}
