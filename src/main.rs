fn main() -> std::process::ExitCode {
    debatemate_lib::run()
}
