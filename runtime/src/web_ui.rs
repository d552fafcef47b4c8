/// Single-page chat client served at `/` in web mode
pub const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Memory Bot</title>
<style>
  body { font-family: system-ui, sans-serif; max-width: 760px; margin: 2rem auto; padding: 0 1rem; color: #222; }
  header { display: flex; justify-content: space-between; align-items: center; }
  #log { border: 1px solid #ddd; border-radius: 8px; height: 60vh; overflow-y: auto; padding: 1rem; background: #fafafa; }
  .msg { margin: .5rem 0; padding: .5rem .75rem; border-radius: 8px; white-space: pre-wrap; }
  .user { background: #dbeafe; margin-left: 20%; }
  .agent { background: #fff; border: 1px solid #e5e7eb; margin-right: 20%; }
  .system { color: #6b7280; font-size: .85rem; text-align: center; }
  form { display: flex; gap: .5rem; margin-top: 1rem; }
  input[type=text] { flex: 1; padding: .6rem; border: 1px solid #ccc; border-radius: 6px; }
  button { padding: .6rem 1rem; border: 0; border-radius: 6px; background: #2563eb; color: #fff; cursor: pointer; }
  button.secondary { background: #6b7280; }
</style>
</head>
<body>
<header>
  <h1>Memory Bot</h1>
  <div>
    <label>User <input id="user" type="text" value="user_123" size="10"></label>
    <button class="secondary" id="new">New session</button>
    <button class="secondary" id="save">Save memory</button>
  </div>
</header>
<div id="log"></div>
<form id="form">
  <input id="message" type="text" placeholder="Say something..." autocomplete="off">
  <button type="submit">Send</button>
</form>
<script>
const log = document.getElementById('log');
const user = () => document.getElementById('user').value.trim();

function add(text, cls) {
  const div = document.createElement('div');
  div.className = 'msg ' + cls;
  div.textContent = text;
  log.appendChild(div);
  log.scrollTop = log.scrollHeight;
}

async function post(path, body) {
  const res = await fetch(path, {
    method: 'POST',
    headers: { 'Content-Type': 'application/json' },
    body: JSON.stringify(body),
  });
  return res.json();
}

document.getElementById('form').addEventListener('submit', async (e) => {
  e.preventDefault();
  const input = document.getElementById('message');
  const message = input.value.trim();
  if (!message) return;
  input.value = '';
  add(message, 'user');
  try {
    const data = await post('/chat', { message, user_id: user() });
    if (data.success) {
      add(data.response, 'agent');
    } else {
      add('Error: ' + data.error, 'system');
    }
  } catch (err) {
    add('Error: ' + err, 'system');
  }
});

document.getElementById('new').addEventListener('click', async () => {
  const data = await post('/new_session', { user_id: user() });
  log.innerHTML = '';
  add(data.success ? 'New session ' + data.session_id : 'Error: ' + data.error, 'system');
});

document.getElementById('save').addEventListener('click', async () => {
  const data = await post('/save_memory', { user_id: user() });
  add(data.success ? data.message : 'Error: ' + data.error, 'system');
});
</script>
</body>
</html>
"#;
