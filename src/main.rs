fn main() {
    kcc_chat_lib::run()
}
