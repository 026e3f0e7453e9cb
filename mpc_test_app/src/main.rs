use std::{cell::RefCell, error::Error, str::FromStr, time::Instant};

use argh::FromArgs;
use mpc_engine::{
    config::ProtocolConfig,
    dealer::{PreprocessingCounts, ShareDealer},
    fields::{Gf64Bit, Mersenne127, Mersenne61},
    processor::Processor,
    simulation::{setup_replicated, setup_shamir, setup_spdz, simulate, PartySetup},
    MpcField, Opener, ProtocolError, Share, SharingScheme,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Field type for the simulation.
enum FieldType {
    Mersenne61,
    Mersenne127,
    Gf64,
}

impl FromStr for FieldType {
    type Err = &'static str;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "61" => Ok(FieldType::Mersenne61),
            "127" => Ok(FieldType::Mersenne127),
            "gf64" => Ok(FieldType::Gf64),
            _ => Err("Unsupported field type. Available options: 61, 127, gf64"),
        }
    }
}

#[derive(FromArgs)]
/// Multiplies a batch of random secret-shared values among simulated parties.
struct Options {
    /// sharing scheme: spdz, rep3 or shamir
    #[argh(option, default = "SharingScheme::AdditiveMac")]
    scheme: SharingScheme,

    /// number of parties participating in protocol
    #[argh(option, default = "3")]
    parties: usize,

    /// number of multiplications in the batch
    #[argh(option, default = "1000")]
    batch_size: usize,

    /// target field
    #[argh(option, default = "FieldType::Mersenne127")]
    field: FieldType,

    /// path to protocol configuration (JSON)
    #[argh(option)]
    config: Option<String>,

    /// seed for the trusted dealer
    #[argh(option, default = "0")]
    seed: u64,
}

type Clear<D> = <<D as ShareDealer>::Share as Share>::Clear;

/// Multiply random pairs on every party and open the products.
/// Returns expected products and each party's opened products.
async fn multiply_batch<D, O>(
    mut dealer: D,
    setups: Vec<PartySetup<O, D::Share>>,
    batch_size: usize,
) -> (Vec<Clear<D>>, Vec<Result<Vec<Clear<D>>, ProtocolError>>)
where
    D: ShareDealer,
    O: Opener<Share = D::Share>,
{
    let num_parties = dealer.num_parties();
    let mut expected = Vec::with_capacity(batch_size);
    let mut inputs = vec![Vec::with_capacity(batch_size); num_parties];
    for _ in 0..batch_size {
        let (x, y) = (dealer.random_value(), dealer.random_value());
        expected.push(x * y);
        let pairs = dealer.share(x).into_iter().zip(dealer.share(y));
        for (party, pair) in inputs.iter_mut().zip(pairs) {
            party.push(pair);
        }
    }

    let setups = RefCell::new(setups.into_iter().map(Some).collect::<Vec<_>>());
    let results = simulate(num_parties, |id, player| {
        let setup = setups.borrow_mut()[id].take();
        let pairs = inputs[id].clone();
        async move {
            let PartySetup {
                opener,
                preprocessing,
            } = setup.ok_or(ProtocolError::ProtocolMisuse("party set up twice"))?;
            let mut processor = Processor::new(player, opener, preprocessing);
            let products = processor.mul(&pairs).await?;
            let opened = processor.open(&products).await?;
            processor.check().await?;
            Ok::<_, ProtocolError>(opened)
        }
    })
    .await;

    (expected, results)
}

async fn run<F: MpcField>(
    options: &Options,
    config: &ProtocolConfig,
) -> Result<(), Box<dyn Error>> {
    let counts = PreprocessingCounts {
        triples: options.batch_size,
        ..Default::default()
    };
    let start = Instant::now();

    let (expected, results) = match options.scheme {
        SharingScheme::AdditiveMac => {
            let (dealer, setups) = setup_spdz::<F>(options.parties, &counts, config, options.seed);
            multiply_batch(dealer, setups, options.batch_size).await
        }
        SharingScheme::Replicated3 => {
            if options.parties != 3 {
                return Err(ProtocolError::InvalidParameters(
                    "replicated sharing runs with exactly 3 parties".to_string(),
                )
                .into());
            }
            let (dealer, setups) = setup_replicated::<F>(&counts, config, options.seed);
            multiply_batch(dealer, setups, options.batch_size).await
        }
        SharingScheme::ShamirThreshold => {
            let (dealer, setups) =
                setup_shamir::<F>(options.parties, &counts, config, options.seed)?;
            multiply_batch(dealer, setups, options.batch_size).await
        }
    };

    let elapsed = start.elapsed();
    let mut failed = false;
    for (id, result) in results.iter().enumerate() {
        match result {
            Ok(products) if *products == expected => {}
            Ok(_) => {
                error!(party = id, "Opened products differ from expected values");
                failed = true;
            }
            Err(err) => {
                error!(party = id, %err, "Party failed");
                failed = true;
            }
        }
    }
    if failed {
        return Err("multiplication batch failed".into());
    }

    info!(
        scheme = ?options.scheme,
        parties = options.parties,
        batch_size = options.batch_size,
        elapsed_ms = elapsed.as_millis() as u64,
        "All parties opened correct products"
    );
    Ok(())
}

fn init_tracing() -> Result<(), Box<dyn Error>> {
    let env_filter = EnvFilter::builder()
        .with_default_directive("mpc_test_app=info".parse()?)
        .from_env_lossy();
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    init_tracing()?;
    let options: Options = argh::from_env();
    let config = match &options.config {
        Some(path) => ProtocolConfig::load(path)?,
        None => ProtocolConfig::default(),
    };

    match options.field {
        FieldType::Mersenne61 => run::<Mersenne61>(&options, &config).await,
        FieldType::Mersenne127 => run::<Mersenne127>(&options, &config).await,
        FieldType::Gf64 => run::<Gf64Bit>(&options, &config).await,
    }
}
