fn main() {
    pulsar_sift::cli::run();
}
