/// Run a command and capture its stdout.
#[macro_export]
macro_rules! run_and_capture {
    ($cmd:expr) => {{
        let mut out = Vec::new();
        $cmd(&mut out).await?;
        String::from_utf8(out)?
    }};
}
