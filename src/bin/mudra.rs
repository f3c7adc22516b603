fn main() {
    mudra::cli::run()
}
