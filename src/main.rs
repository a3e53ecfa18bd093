fn main() -> std::process::ExitCode {
    spotify_setup_lib::run()
}
