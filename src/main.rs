fn main() {
    if let Err(error) = mealway::run() {
        eprintln!("mealway: {error:#}");
        std::process::exit(mealway::exit_code(&error));
    }
}
