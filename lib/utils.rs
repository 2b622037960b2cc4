//! Small output helpers shared by the binaries.

/// Create a directory and all its parents if it doesn't already exist.
///
/// Evaluates to a `std::io::Result<std::path::PathBuf>` holding the path.
#[macro_export]
macro_rules! mkdir {
    ( $dir:expr ) => {
        {
            let dir: std::path::PathBuf = ($dir).into();
            std::fs::create_dir_all(&dir).map(|_| dir)
        }
    }
}

/// Write a set of named arrays to a `.npz` file.
///
/// Evaluates to a `Result<(), ndarray_npy::WriteNpzError>`.
/// ```ignore
/// write_npz!(
///     outdir.join("data.npz"),
///     arrays: {
///         "time" => &time,
///         "pop" => &pop,
///     }
/// )?;
/// ```
#[macro_export]
macro_rules! write_npz {
    (
        $filename:expr,
        arrays: { $( $name:expr => $arr:expr ),+ $(,)? } $(,)?
    ) => {
        (|| -> Result<(), ndarray_npy::WriteNpzError> {
            let file = std::fs::File::create($filename)
                .map_err(ndarray_npy::WriteNpyError::from)?;
            let mut npz = ndarray_npy::NpzWriter::new(file);
            $( npz.add_array($name, $arr)?; )+
            npz.finish()?;
            Ok(())
        })()
    }
}

/// Call `println!` and immediately flush.
#[macro_export]
macro_rules! println_flush {
    ( $fmt:literal $(, $val:expr )* $(,)? ) => {
        {
            println!($fmt $(, $val )*);
            std::io::Write::flush(&mut std::io::stdout()).ok();
        }
    }
}
