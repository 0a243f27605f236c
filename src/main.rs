fn main() {
    publiceye_lib::run()
}
