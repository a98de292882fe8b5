mod cmdline;
mod driver;

use mia_utils::MultiError;

fn main() -> Result<(), MultiError> {
    driver::run_synthesis()
}
