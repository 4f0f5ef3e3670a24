extern "C" {
    fn make_42() -> i32;
}

#[no_mangle]
pub extern "C" fn add_to_42(n: i32) -> i32 {
    unsafe { make_42() + n }
}
