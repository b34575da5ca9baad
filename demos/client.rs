use anyhow::Result;
use mooring::{
  client::{Client, Config},
  Channel, EffectTarget, Message, Transform,
};
use std::{
  collections::HashMap,
  thread,
  time::{Duration, Instant},
};

fn init_log() -> Result<()> {
  // default RUST_LOG=info
  std::env::set_var(
    "RUST_LOG",
    std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
  );
  Ok(env_logger::try_init()?)
}

struct Scene {
  objects: HashMap<String, (Transform, bool)>,
}

impl Scene {
  fn new() -> Self {
    let mut objects = HashMap::new();
    objects.insert("cube".to_string(), (Transform::default(), true));
    Self { objects }
  }
}

impl EffectTarget for Scene {
  fn set_transform(&mut self, name: &str, transform: &Transform) -> bool {
    match self.objects.get_mut(name) {
      Some(object) => {
        log::info!("{name} moved to {:?}", transform.position);
        object.0 = *transform;
        true
      }
      None => false,
    }
  }

  fn set_active(&mut self, name: &str, active: bool) -> bool {
    match self.objects.get_mut(name) {
      Some(object) => {
        object.1 = active;
        true
      }
      None => false,
    }
  }
}

fn main() -> Result<()> {
  init_log()?;

  // pass the server's ip as the first argument; empty means loopback
  let server_ip = std::env::args().nth(1).unwrap_or_default();
  let mut client = Client::connect(Config { server_ip, ..Config::default() })?;
  let mut scene = Scene::new();

  const TICK: Duration = Duration::from_millis(16);
  let mut elapsed = Duration::ZERO;
  let mut toggled = false;
  loop {
    let now = Instant::now();
    for event in client.tick(now, &mut scene)? {
      log::info!("{event:?}");
    }

    // five seconds in, hide the cube on the server
    elapsed += TICK;
    if client.is_connected() && !toggled && elapsed >= Duration::from_secs(5) {
      toggled = true;
      client.send(
        &Message::SetActive { name: "cube".into(), active: false },
        Channel::Reliable,
      );
    }

    thread::sleep(TICK);
  }
}
