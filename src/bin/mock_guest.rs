#![forbid(unsafe_code)]

//! Emulator stand-in used by the integration tests.
//!
//! Accepts the same command line the harness hands to `qemu-system-arm`,
//! connects to the `-serial unix:<path>` socket as a client, and plays one
//! scripted guest behavior chosen by the `-kernel` file stem. A `quit` line
//! on stdin ends the process, mirroring the console shutdown command the
//! real emulator honors.

use std::io::{self, BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::process;
use std::thread;

const SIG: &str = "--a94e2gfwdd--";

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(serial) = find_serial(&args) else {
        eprintln!("mock-guest: missing -serial unix:<path>");
        process::exit(2);
    };
    let behavior = find_kernel_stem(&args).unwrap_or_else(|| String::from("responsive"));

    spawn_stdin_watcher();

    let stream = match UnixStream::connect(&serial) {
        Ok(stream) => stream,
        Err(err) => {
            eprintln!("mock-guest: connect {serial}: {err}");
            process::exit(2);
        }
    };
    if let Err(err) = play(&behavior, stream) {
        eprintln!("mock-guest: {err}");
        process::exit(2);
    }

    // Socket closed; stay alive until the console says quit, like the
    // real emulator would.
    loop {
        thread::park();
    }
}

fn play(behavior: &str, stream: UnixStream) -> io::Result<()> {
    let mut writer = stream.try_clone()?;
    let mut reader = BufReader::new(stream);

    match behavior {
        // Never speaks; the boot handshake has to time out.
        "silent" => drain(&mut reader),
        // Ready at boot, then ignores every command.
        "mute" => {
            send_line(&mut writer, "$please")?;
            drain(&mut reader)
        }
        _ => {
            send_line(&mut writer, "$please")?;
            serve(behavior, &mut reader, &mut writer)
        }
    }
}

fn serve(
    behavior: &str,
    reader: &mut BufReader<UnixStream>,
    writer: &mut UnixStream,
) -> io::Result<()> {
    loop {
        let Some(line) = read_line(reader)? else {
            return Ok(());
        };
        let Some(name) = line.strip_prefix("$run ") else {
            continue;
        };

        match behavior {
            // Echoes back whatever arrives on the serial line after the
            // command, which is the forwarded stdin payload.
            "parrot" => {
                let Some(data) = read_line(reader)? else {
                    return Ok(());
                };
                send_sig(writer, "echo", &format!("{data}\r\n"))?;
                send_line(writer, "$success")?;
            }
            "failing" => {
                send_sig(writer, "echo", "something went wrong\r\n")?;
                send_line(writer, "$failure broken as requested")?;
            }
            "checking" => {
                send_sig(writer, "echo", "evidence line\r\n")?;
                send_line(writer, "$check")?;
            }
            // Answers with a frame the harness does not recognize.
            "imposter" => {
                send_sig(writer, "shout", "not an echo\r\n")?;
                send_line(writer, "$success")?;
            }
            // Stalls mid-frame after the output, leaving a torn verdict
            // in the harness buffer.
            "trickle" => {
                send_sig(writer, "echo", &format!("ran {name}\r\n"))?;
                writer.write_all(b"$succ")?;
                writer.flush()?;
                return drain(reader);
            }
            _ => {
                send_sig(writer, "echo", &format!("ran {name}\r\n"))?;
                send_line(writer, "$success")?;
            }
        }
        send_line(writer, "$please")?;
    }
}

fn send_line(writer: &mut UnixStream, line: &str) -> io::Result<()> {
    writer.write_all(line.as_bytes())?;
    writer.write_all(b"\r\n")?;
    writer.flush()
}

fn send_sig(writer: &mut UnixStream, name: &str, body: &str) -> io::Result<()> {
    writer.write_all(format!(":{name} {SIG}\r\n").as_bytes())?;
    writer.write_all(body.as_bytes())?;
    writer.write_all(format!("\r\n{SIG}\r\n").as_bytes())?;
    writer.flush()
}

fn read_line(reader: &mut impl BufRead) -> io::Result<Option<String>> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    Ok(Some(line))
}

fn drain(reader: &mut impl BufRead) -> io::Result<()> {
    while read_line(reader)?.is_some() {}
    Ok(())
}

fn spawn_stdin_watcher() {
    thread::spawn(|| {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) if line.trim() == "quit" => process::exit(0),
                Ok(_) => {}
                Err(_) => process::exit(0),
            }
        }
        process::exit(0);
    });
}

fn find_serial(args: &[String]) -> Option<String> {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "-serial" {
            return iter.next()?.strip_prefix("unix:").map(str::to_owned);
        }
    }
    None
}

fn find_kernel_stem(args: &[String]) -> Option<String> {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "-kernel" {
            let path = iter.next()?;
            return Path::new(path)
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned());
        }
    }
    None
}
